//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tern_agent::SearchConfig;
use tern_document::ParserOptions;
use tern_wire::BackendConfig;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for tern
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root URL of the travel backend
    pub base_url: String,
    /// Bearer credential (alternative to TERN_API_KEY)
    pub api_key: Option<String>,
    pub search: SearchSection,
    pub parser: ParserSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            search: SearchSection::default(),
            parser: ParserSection::default(),
        }
    }
}

/// `[search]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Seconds between polls when the backend does not say
    pub poll_interval_secs: u64,
    /// Stop after this many consecutive poll failures (unset = never)
    pub max_consecutive_failures: Option<u32>,
    /// Tool name sent with the completion report
    pub report_tool_name: String,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 6,
            max_consecutive_failures: None,
            report_tool_name: "search_flights".to_string(),
        }
    }
}

/// `[parser]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSection {
    /// Extra tool names whose completion may carry a JSON result
    pub special_tools: Vec<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tern")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for TERN_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("TERN_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse config file content
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Write the example config if no config file exists yet
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// API key from the config, then the environment
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("TERN_API_KEY").ok())
            .filter(|k| !k.is_empty())
    }

    /// Backend client configuration
    pub fn backend_config(&self) -> BackendConfig {
        let config = BackendConfig::new(&self.base_url);
        match self.api_key() {
            Some(key) => config.with_api_key(key),
            None => config,
        }
    }

    /// Search orchestrator configuration
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            poll_interval: Duration::from_secs(self.search.poll_interval_secs),
            max_consecutive_failures: self.search.max_consecutive_failures,
            report_tool_name: self.search.report_tool_name.clone(),
        }
    }

    /// Document parser options
    pub fn parser_options(&self) -> ParserOptions {
        ParserOptions::default().with_special_tools(self.parser.special_tools.iter().cloned())
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# tern configuration file
# Place at ~/.config/tern/config.toml (Linux) or set TERN_CONFIG_PATH

# Root URL of the travel backend
base_url = "http://localhost:8000"

# Bearer credential (optional - TERN_API_KEY works too)
# api_key = "..."

[search]
# Seconds between result polls when the backend does not suggest a delay
poll_interval_secs = 6

# Give up after this many consecutive failed polls (unset = keep retrying)
# max_consecutive_failures = 20

# Tool name sent back with the completion report
report_tool_name = "search_flights"

[parser]
# Extra tools whose completion marker may be followed by a JSON result
# special_tools = ["create_hotel_itinerary"]
special_tools = []
"#
}

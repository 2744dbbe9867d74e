//! tern - command line client for the travel agent

mod commands;
mod config;
mod render;
mod utils;

use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tern_wire::HttpBackend;
use tracing_subscriber::EnvFilter;

/// tern - talk to the travel agent, follow flight searches
#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend root URL (overrides the config file)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a message and stream the agent's reply
    Chat {
        message: String,
        /// Attach an image (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
        /// Print the parsed reply as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a saved reply transcript (`-` reads stdin)
    Parse {
        source: String,
        /// Print the parsed document as JSON
        #[arg(long)]
        json: bool,
    },
    /// Poll a flight search until it finishes
    Search {
        search_id: String,
        /// Book this flight once the search ends
        #[arg(long)]
        book: Option<String>,
        /// Seconds between polls (overrides the config file)
        #[arg(long)]
        poll_interval: Option<u64>,
    },
    /// Write an example config file
    InitConfig,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tern=debug,tern_wire=debug,tern_document=debug,tern_agent=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = config::Config::load();
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }

    match args.command {
        Command::InitConfig => {
            let path = config::Config::init()?;
            println!("Config file at: {}", path.display());
            println!("\nExample config:\n{}", config::example_config());
            Ok(())
        }
        Command::Parse { source, json } => commands::parse::run(&config, &source, json),
        Command::Chat {
            message,
            images,
            json,
        } => commands::chat::run(&config, &message, &images, json).await,
        Command::Search {
            search_id,
            book,
            poll_interval,
        } => {
            if let Some(secs) = poll_interval {
                config.search.poll_interval_secs = secs;
            }
            let backend = HttpBackend::new(config.backend_config())?;
            commands::search::run(&config, Arc::new(backend), &search_id, book.as_deref()).await
        }
    }
}

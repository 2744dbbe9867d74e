//! `tern parse`: parse a saved reply transcript

use anyhow::Context;
use std::io::Read;
use tern_document::DocumentParser;

use crate::{config::Config, render};

/// Read the transcript from a file, or stdin when `source` is `-`
fn read_source(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read transcript from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(source).with_context(|| format!("failed to read {}", source))
}

pub fn run(config: &Config, source: &str, json: bool) -> anyhow::Result<()> {
    let text = read_source(source)?;
    let document = DocumentParser::new(config.parser_options()).parse_complete(&text);
    tracing::debug!(nodes = document.len(), "parsed transcript");
    render::print_document(&document, json)
}

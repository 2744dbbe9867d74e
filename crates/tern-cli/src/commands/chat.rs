//! `tern chat`: stream one agent turn

use async_trait::async_trait;
use serde_json::{Value, json};
use std::{path::PathBuf, sync::Arc};
use tern_agent::{
    EventNormalizer, HttpTransport, LiveReply, NormalizerConfig, PanelCollaborator, TurnRunner,
};
use tern_document::DocumentParser;
use tern_wire::{AgentStreamEvent, HttpBackend, StreamRequest};

use crate::{commands::search, config::Config, render, utils};

/// Acknowledges panel updates; the side channel prints them
struct ConsolePanel;

#[async_trait]
impl PanelCollaborator for ConsolePanel {
    async fn update(&self, panel_type: &str, _parameters: &Value) -> tern_agent::Result<Value> {
        Ok(json!({ "success": true, "panelType": panel_type }))
    }
}

/// Narrate a live event on stderr
fn narrate(event: &AgentStreamEvent) {
    match event {
        AgentStreamEvent::ToolStart { tool_name, .. } => eprintln!("[Running {}...]", tool_name),
        AgentStreamEvent::ToolProgress {
            tool_name, message, ..
        } => eprintln!("[{}: {}]", tool_name, message),
        AgentStreamEvent::ToolComplete {
            tool_name, result, ..
        } => {
            if result.get("success") == Some(&Value::Bool(false)) {
                eprintln!("[{} failed: {}]", tool_name, result);
            } else {
                eprintln!("[{} done]", tool_name);
            }
        }
        AgentStreamEvent::Status { message } => eprintln!("[{}]", message),
        AgentStreamEvent::Error { message } => eprintln!("Error: {}", message),
        _ => {}
    }
}

pub async fn run(
    config: &Config,
    message: &str,
    images: &[PathBuf],
    json: bool,
) -> anyhow::Result<()> {
    let backend = HttpBackend::new(config.backend_config())?;

    let mut request = StreamRequest::new(message);
    for path in images {
        request = request.with_image(utils::read_image(path)?);
    }

    let normalizer = EventNormalizer::new(NormalizerConfig {
        search_tools: vec![config.search.report_tool_name.clone()],
    })
    .with_panel(Arc::new(ConsolePanel));

    let mut panels = normalizer.subscribe_panels();
    let panel_printer = tokio::spawn(async move {
        while let Ok(update) = panels.recv().await {
            eprintln!(
                "[panel {} updated: {}]",
                update.panel_type,
                utils::truncate_chars(&update.data.to_string(), 120)
            );
        }
    });

    let runner = TurnRunner::new(Arc::new(HttpTransport::new(backend.clone())));
    let (mut events, handle) = runner.spawn(request, normalizer);

    let abort = handle.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let mut reply = LiveReply::new(DocumentParser::new(config.parser_options()));
    while let Some(event) = events.recv().await {
        narrate(&event);
        if let Some(document) = reply.apply(&event) {
            tracing::debug!(nodes = document.len(), "reply re-parsed");
        }
    }
    ctrl_c.abort();
    panel_printer.abort();

    let cancelled = handle.is_cancelled();
    let (document, turn) = reply.finish();
    render::print_document(&document, json)?;

    if cancelled {
        return Ok(());
    }
    if let Some(search_id) = turn.search_ids().last() {
        eprintln!("[Following search {}]", search_id);
        search::follow(config, Arc::new(backend), search_id).await?;
    }
    Ok(())
}

//! Plain-text and JSON output of parsed documents

use tern_document::{Document, DocumentNode, ToolState};

use crate::utils::truncate_chars;

const RESULT_PREVIEW_CHARS: usize = 160;

fn tool_line(tool: &ToolState, indent: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let state = if tool.is_complete {
        if tool.complete_text.is_empty() {
            "done".to_string()
        } else {
            format!("done: {}", tool.complete_text)
        }
    } else {
        match tool.latest_progress() {
            Some(p) => format!("running {}%", p),
            None => "running".to_string(),
        }
    };
    lines.push(format!("{}[{}] {} ({})", indent, tool.name, tool.description, state));

    if let Some(step) = tool.progress_steps.last() {
        if !tool.is_complete {
            lines.push(format!("{}  {}", indent, step.text));
        }
    }
    if let Some(ref result) = tool.result_data {
        lines.push(format!(
            "{}  result: {}",
            indent,
            truncate_chars(&result.to_string(), RESULT_PREVIEW_CHARS)
        ));
    }
    lines
}

/// Render a document as an indented outline
pub fn outline(document: &Document) -> String {
    let mut lines = Vec::new();
    for node in document {
        match node {
            DocumentNode::Text { content } => {
                let text = content.trim();
                if !text.is_empty() {
                    lines.push(text.to_string());
                }
            }
            DocumentNode::Status { content } => lines.push(format!("> {}", content)),
            DocumentNode::Reasoning(block) => {
                let mut head = format!("[reasoning] {}", block.text);
                if let Some(tokens) = block.tokens {
                    head.push_str(&format!(" ({} tokens)", tokens));
                }
                lines.push(head);
                for tool in &block.tools {
                    lines.extend(tool_line(tool, "  "));
                }
                if block.is_complete && !block.complete_text.is_empty() {
                    lines.push(format!("  => {}", block.complete_text));
                }
            }
            DocumentNode::Tool(tool) => lines.extend(tool_line(tool, "")),
        }
    }
    lines.join("\n")
}

/// Print a document to stdout
pub fn print_document(document: &Document, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(document)?);
    } else {
        println!("{}", outline(document));
    }
    Ok(())
}

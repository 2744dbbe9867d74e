//! Normalized agent stream events and turn accumulation

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

use crate::dialect::SseFrame;

/// Events the runtime emits after normalizing either backend dialect.
///
/// `ToolStart` and `ToolComplete` for the same invocation always share an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentStreamEvent {
    /// A slice of assistant text to append to the conversation text
    MessageDelta { delta: String },
    /// A tool invocation started
    ToolStart {
        id: String,
        tool_name: String,
        parameters: serde_json::Value,
    },
    /// Progress narration for a running tool
    ToolProgress {
        id: String,
        tool_name: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        progress: Option<u8>,
    },
    /// A tool invocation finished
    ToolComplete {
        id: String,
        tool_name: String,
        parameters: serde_json::Value,
        result: serde_json::Value,
    },
    ReasoningStart { text: String },
    ReasoningProgress {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tokens: Option<u32>,
    },
    ReasoningComplete { text: String },
    /// One-shot status announcement
    Status { message: String },
    /// Error reported by the backend or the transport
    Error { message: String },
    /// The agent announced a progressive flight search
    SearchAnnounced { search_id: String },
    /// End of the turn
    Done,
}

impl AgentStreamEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentStreamEvent::Done)
    }

    /// Tool call id carried by this event, if any
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            AgentStreamEvent::ToolStart { id, .. }
            | AgentStreamEvent::ToolProgress { id, .. }
            | AgentStreamEvent::ToolComplete { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Panel content pushed straight to the panel subsystem, bypassing the text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelUpdate {
    pub panel_type: String,
    pub data: serde_json::Value,
}

/// A stream of raw SSE frames from the backend
pub type FrameStream =
    Pin<Box<dyn Stream<Item = crate::error::Result<SseFrame>> + Send>>;

/// A completed tool call recorded during a turn
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTool {
    pub id: String,
    pub tool_name: String,
    pub result: serde_json::Value,
}

/// Accumulates one assistant turn from normalized events.
///
/// The conversation text only ever grows: deltas are appended, nothing is
/// rewritten. Tool completions and errors are kept on the side.
#[derive(Debug, Default)]
pub struct TurnBuffer {
    text: String,
    tools: Vec<CompletedTool>,
    errors: Vec<String>,
    search_ids: Vec<String>,
    done: bool,
}

impl TurnBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the buffer.
    ///
    /// Returns `true` when the conversation text grew.
    pub fn process_event(&mut self, event: &AgentStreamEvent) -> bool {
        match event {
            AgentStreamEvent::MessageDelta { delta } => {
                if delta.is_empty() {
                    return false;
                }
                self.text.push_str(delta);
                return true;
            }
            AgentStreamEvent::ToolComplete {
                id,
                tool_name,
                result,
                ..
            } => {
                self.tools.push(CompletedTool {
                    id: id.clone(),
                    tool_name: tool_name.clone(),
                    result: result.clone(),
                });
            }
            AgentStreamEvent::SearchAnnounced { search_id } => {
                if !self.search_ids.contains(search_id) {
                    self.search_ids.push(search_id.clone());
                }
            }
            AgentStreamEvent::Error { message } => {
                self.errors.push(message.clone());
            }
            AgentStreamEvent::Done => {
                self.done = true;
            }
            _ => {}
        }
        false
    }

    /// The accumulated conversation text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Tool calls completed so far, in completion order
    pub fn completed_tools(&self) -> &[CompletedTool] {
        &self.tools
    }

    /// Errors reported during the turn
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Search ids announced during the turn
    pub fn search_ids(&self) -> &[String] {
        &self.search_ids
    }

    /// Whether the turn reached its terminal event
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consume the buffer, returning the final text
    pub fn into_text(self) -> String {
        self.text
    }
}

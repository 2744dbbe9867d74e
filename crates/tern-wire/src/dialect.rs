//! Decoding of raw SSE frames into backend wire events
//!
//! The backend speaks two dialects. The flat dialect sends one event per tool
//! lifecycle step with an explicit identifier (`tool_start`, `tool_complete`,
//! `reasoning_start`, ...). The enveloped dialect wraps tool activity in
//! `tool_call` / `tool_result` envelopes and never supplies an identifier, so
//! pairing those is left to the runtime's correlator.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

/// Literal data payload that terminates the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// One server-sent event as received from the wire
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field (`message` when the server omits it)
    pub event: String,
    /// The `id:` field
    pub id: String,
    /// The `data:` field, multi-line payloads already joined
    pub data: String,
}

impl SseFrame {
    /// Create a frame with the default event name
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: "message".to_string(),
            id: String::new(),
            data: data.into(),
        }
    }

    /// Create a frame with an explicit event name
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            id: String::new(),
            data: data.into(),
        }
    }

    /// Whether this frame carries the `[DONE]` sentinel
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }
}

impl From<reqwest_eventsource::Event> for SseFrame {
    fn from(event: reqwest_eventsource::Event) -> Self {
        match event {
            reqwest_eventsource::Event::Open => Self::default(),
            reqwest_eventsource::Event::Message(msg) => Self {
                event: msg.event,
                id: msg.id,
                data: msg.data,
            },
        }
    }
}

/// Tool payload nested inside an enveloped `tool_call` / `tool_result`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolEnvelope {
    #[serde(alias = "name")]
    pub tool_name: String,
    #[serde(default, alias = "arguments")]
    pub parameters: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
}

/// A decoded backend event, before normalization
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// Assistant text delta
    #[serde(alias = "message_delta", alias = "text")]
    Message {
        #[serde(alias = "delta", alias = "text")]
        content: String,
    },
    /// Flat dialect: tool started
    ToolStart {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "name")]
        tool_name: String,
        #[serde(default, alias = "arguments")]
        parameters: Option<Value>,
    },
    /// Flat dialect: tool progress narration
    ToolProgress {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "name")]
        tool_name: String,
        #[serde(default, alias = "content")]
        message: String,
        #[serde(default)]
        progress: Option<u8>,
    },
    /// Flat dialect: tool finished
    ToolComplete {
        #[serde(default)]
        id: Option<String>,
        #[serde(alias = "name")]
        tool_name: String,
        #[serde(default, alias = "arguments")]
        parameters: Option<Value>,
        #[serde(default)]
        result: Value,
    },
    ReasoningStart {
        #[serde(default)]
        content: String,
    },
    ReasoningProgress {
        #[serde(default)]
        content: String,
        #[serde(default)]
        tokens: Option<u32>,
    },
    ReasoningComplete {
        #[serde(default)]
        content: String,
    },
    Status {
        #[serde(alias = "content")]
        message: String,
    },
    Error {
        #[serde(alias = "content")]
        message: String,
    },
    Done,
    /// Enveloped dialect: tool invoked, no identifier supplied
    ToolCall { data: ToolEnvelope },
    /// Enveloped dialect: tool returned, no identifier supplied
    ToolResult { data: ToolEnvelope },
}

/// Decode one SSE frame.
///
/// Returns `Ok(None)` for frames that carry nothing (keep-alives, the open
/// notification). The `type` field of the JSON payload selects the event; when
/// it is missing, the SSE event name is used instead.
pub fn decode(frame: &SseFrame) -> Result<Option<WireEvent>> {
    let data = frame.data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == DONE_SENTINEL {
        return Ok(Some(WireEvent::Done));
    }

    let mut value: Value = serde_json::from_str(data)?;
    if let Value::Object(ref mut map) = value {
        if !map.contains_key("type") && !frame.event.is_empty() {
            map.insert("type".to_string(), Value::String(frame.event.clone()));
        }
    }

    Ok(Some(serde_json::from_value(value)?))
}

//! Event normalization
//!
//! Turns decoded wire events from either backend dialect into the single
//! `AgentStreamEvent` vocabulary. One wire event yields zero or more
//! normalized events, always in arrival order. Completions of
//! `save_to_memory` and `update_panel` run their collaborator before the
//! completion is forwarded; failures become a `{success: false, message}`
//! payload on that same completion and never end the stream.

use serde_json::Value;
use std::sync::Arc;
use tern_wire::{
    AgentStreamEvent, PanelUpdate, SseFrame, WireEvent,
    dialect::{self, ToolEnvelope},
};
use tokio::sync::broadcast;

use crate::{
    collaborator::{
        MemoryCollaborator, PanelCollaborator, SAVE_TO_MEMORY, UPDATE_PANEL, failure_payload,
        recover_parameters, validate_panel_parameters, with_panel_type,
    },
    correlator::ToolCallCorrelator,
    error::{Error, Result},
};

/// Normalizer configuration
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Tools whose completion announces a progressive flight search
    pub search_tools: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            search_tools: vec!["search_flights".to_string()],
        }
    }
}

/// Stateful translator from wire events to normalized events for one turn
pub struct EventNormalizer {
    config: NormalizerConfig,
    correlator: ToolCallCorrelator,
    memory: Option<Arc<dyn MemoryCollaborator>>,
    panel: Option<Arc<dyn PanelCollaborator>>,
    panel_validator: Option<Arc<jsonschema::Validator>>,
    panel_tx: broadcast::Sender<PanelUpdate>,
    skipped: u64,
}

impl Default for EventNormalizer {
    fn default() -> Self {
        Self::new(NormalizerConfig::default())
    }
}

impl EventNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        let (panel_tx, _) = broadcast::channel(64);
        Self {
            config,
            correlator: ToolCallCorrelator::new(),
            memory: None,
            panel: None,
            panel_validator: None,
            panel_tx,
            skipped: 0,
        }
    }

    /// Attach the memory collaborator
    pub fn with_memory(mut self, memory: Arc<dyn MemoryCollaborator>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Attach the panel collaborator, compiling its parameter schema
    pub fn with_panel(mut self, panel: Arc<dyn PanelCollaborator>) -> Self {
        match jsonschema::validator_for(&panel.parameters_schema()) {
            Ok(validator) => self.panel_validator = Some(Arc::new(validator)),
            Err(e) => {
                tracing::warn!("Panel parameter schema does not compile, skipping validation: {}", e);
                self.panel_validator = None;
            }
        }
        self.panel = Some(panel);
        self
    }

    /// Subscribe to panel updates pushed outside the text stream
    pub fn subscribe_panels(&self) -> broadcast::Receiver<PanelUpdate> {
        self.panel_tx.subscribe()
    }

    /// The correlator for this turn
    pub fn correlator(&self) -> &ToolCallCorrelator {
        &self.correlator
    }

    /// Completions that arrived without a pending start
    pub fn correlation_misses(&self) -> u64 {
        self.correlator.misses()
    }

    /// Close out the turn, dropping starts that never completed
    pub fn end_turn(&mut self) {
        let pending = self.correlator.pending();
        if pending > 0 {
            tracing::debug!(pending, "turn ended with unmatched tool calls");
        }
        self.correlator.clear();
    }

    /// Number of frames dropped because they could not be decoded
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    /// Decode and normalize one SSE frame.
    ///
    /// Frames that fail to decode are logged and skipped.
    pub async fn normalize_frame(&mut self, frame: &SseFrame) -> Vec<AgentStreamEvent> {
        match dialect::decode(frame) {
            Ok(Some(event)) => self.normalize(event).await,
            Ok(None) => Vec::new(),
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(event = %frame.event, "Skipping undecodable stream event: {}", e);
                Vec::new()
            }
        }
    }

    /// Normalize one decoded wire event
    pub async fn normalize(&mut self, event: WireEvent) -> Vec<AgentStreamEvent> {
        match event {
            WireEvent::Message { content } => vec![AgentStreamEvent::MessageDelta { delta: content }],
            WireEvent::ToolStart {
                id,
                tool_name,
                parameters,
            } => {
                let id = match id {
                    Some(id) => id,
                    None => self.correlator.begin(&tool_name),
                };
                vec![AgentStreamEvent::ToolStart {
                    id,
                    tool_name,
                    parameters: parameters.unwrap_or(Value::Null),
                }]
            }
            WireEvent::ToolProgress {
                id,
                tool_name,
                message,
                progress,
            } => {
                let id = id
                    .or_else(|| self.correlator.current(&tool_name).map(str::to_string))
                    .unwrap_or_default();
                vec![AgentStreamEvent::ToolProgress {
                    id,
                    tool_name,
                    message,
                    progress,
                }]
            }
            WireEvent::ToolComplete {
                id,
                tool_name,
                parameters,
                result,
            } => {
                let id = match id {
                    Some(id) => id,
                    None => self.correlator.complete(&tool_name).id,
                };
                self.complete(id, tool_name, parameters, result).await
            }
            WireEvent::ToolCall {
                data: ToolEnvelope {
                    tool_name,
                    parameters,
                    ..
                },
            } => {
                let id = self.correlator.begin(&tool_name);
                vec![AgentStreamEvent::ToolStart {
                    id,
                    tool_name,
                    parameters: parameters.unwrap_or(Value::Null),
                }]
            }
            WireEvent::ToolResult {
                data:
                    ToolEnvelope {
                        tool_name,
                        parameters,
                        result,
                    },
            } => {
                let id = self.correlator.complete(&tool_name).id;
                self.complete(id, tool_name, parameters, result.unwrap_or(Value::Null))
                    .await
            }
            WireEvent::ReasoningStart { content } => {
                vec![AgentStreamEvent::ReasoningStart { text: content }]
            }
            WireEvent::ReasoningProgress { content, tokens } => {
                vec![AgentStreamEvent::ReasoningProgress {
                    text: content,
                    tokens,
                }]
            }
            WireEvent::ReasoningComplete { content } => {
                vec![AgentStreamEvent::ReasoningComplete { text: content }]
            }
            WireEvent::Status { message } => vec![AgentStreamEvent::Status { message }],
            WireEvent::Error { message } => vec![AgentStreamEvent::Error { message }],
            WireEvent::Done => vec![AgentStreamEvent::Done],
        }
    }

    async fn complete(
        &mut self,
        id: String,
        tool_name: String,
        parameters: Option<Value>,
        result: Value,
    ) -> Vec<AgentStreamEvent> {
        let params = recover_parameters(parameters.as_ref(), &result);

        let result = match tool_name.as_str() {
            SAVE_TO_MEMORY => match self.memory {
                Some(ref memory) => memory.save(&params).await.unwrap_or_else(|e| {
                    tracing::warn!("save_to_memory failed: {}", e);
                    failure_payload(e.to_string())
                }),
                None => result,
            },
            UPDATE_PANEL => match self.panel.clone() {
                Some(panel) => self.run_panel(panel.as_ref(), params.clone()).await,
                None => result,
            },
            _ => result,
        };

        let mut events = Vec::with_capacity(2);
        let search_id = if self.config.search_tools.iter().any(|t| *t == tool_name) {
            announced_search_id(&result)
        } else {
            None
        };

        events.push(AgentStreamEvent::ToolComplete {
            id,
            tool_name,
            parameters: params,
            result,
        });
        if let Some(search_id) = search_id {
            events.push(AgentStreamEvent::SearchAnnounced { search_id });
        }
        events
    }

    async fn run_panel(&self, panel: &dyn PanelCollaborator, params: Value) -> Value {
        let params = with_panel_type(params);
        let panel_type = match self.panel_type(&params) {
            Ok(panel_type) => panel_type,
            Err(e) => {
                tracing::warn!("update_panel rejected: {}", e);
                return failure_payload(e.to_string());
            }
        };

        match panel.update(&panel_type, &params).await {
            Ok(payload) => {
                let data = params.get("data").cloned().unwrap_or_else(|| payload.clone());
                // No subscribers is fine; the completion still carries the payload.
                let _ = self.panel_tx.send(PanelUpdate { panel_type, data });
                payload
            }
            Err(e) => {
                tracing::warn!("update_panel failed: {}", e);
                failure_payload(e.to_string())
            }
        }
    }

    fn panel_type(&self, params: &Value) -> Result<String> {
        match self.panel_validator {
            Some(ref validator) => validate_panel_parameters(params, validator),
            None => params
                .get("panel_type")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidParameters("missing panel_type".to_string())),
        }
    }
}

/// Search id carried by a search tool result, if any
fn announced_search_id(result: &Value) -> Option<String> {
    let lookup = |v: &Value| {
        v.get("searchId")
            .or_else(|| v.get("search_id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    lookup(result).or_else(|| result.get("data").and_then(lookup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingMemory {
        saved: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl MemoryCollaborator for RecordingMemory {
        async fn save(&self, parameters: &Value) -> Result<Value> {
            self.saved.lock().push(parameters.clone());
            Ok(json!({"success": true, "message": "Saved"}))
        }
    }

    struct FailingMemory;

    #[async_trait]
    impl MemoryCollaborator for FailingMemory {
        async fn save(&self, _parameters: &Value) -> Result<Value> {
            Err(Error::Collaborator("memory store unavailable".into()))
        }
    }

    struct EchoPanel;

    #[async_trait]
    impl PanelCollaborator for EchoPanel {
        async fn update(&self, panel_type: &str, _parameters: &Value) -> Result<Value> {
            Ok(json!({"success": true, "panel": panel_type}))
        }
    }

    fn frame(data: Value) -> SseFrame {
        SseFrame::data(data.to_string())
    }

    #[tokio::test]
    async fn test_enveloped_pair_shares_id_with_interleaving() {
        let mut normalizer = EventNormalizer::default();

        let start = normalizer
            .normalize_frame(&frame(json!({
                "type": "tool_call",
                "data": {"tool_name": "search_entities", "parameters": {"q": "Lisbon"}}
            })))
            .await;
        let text = normalizer
            .normalize_frame(&frame(json!({"type": "message", "content": "Looking..."})))
            .await;
        let status = normalizer
            .normalize_frame(&frame(json!({"type": "status", "message": "Working"})))
            .await;
        let done = normalizer
            .normalize_frame(&frame(json!({
                "type": "tool_result",
                "data": {"tool_name": "search_entities", "result": {"count": 3}}
            })))
            .await;

        assert_eq!(text.len(), 1);
        assert_eq!(status.len(), 1);
        let (start_id, done_id) = match (&start[..], &done[..]) {
            (
                [AgentStreamEvent::ToolStart { id: a, .. }],
                [AgentStreamEvent::ToolComplete { id: b, result, .. }],
            ) => {
                assert_eq!(result, &json!({"count": 3}));
                (a.clone(), b.clone())
            }
            other => panic!("unexpected events: {:?}", other),
        };
        assert_eq!(start_id, done_id);
        assert_eq!(normalizer.correlator().pending(), 0);
        assert_eq!(normalizer.correlator().misses(), 0);
    }

    #[tokio::test]
    async fn test_flat_ids_pass_through() {
        let mut normalizer = EventNormalizer::default();
        let events = normalizer
            .normalize_frame(&frame(json!({
                "type": "tool_complete", "id": "t-9", "tool_name": "lookup", "result": {"ok": true}
            })))
            .await;
        assert_eq!(events[0].tool_call_id(), Some("t-9"));
        assert_eq!(normalizer.correlator().misses(), 0);
    }

    #[tokio::test]
    async fn test_orphan_result_gets_fresh_id() {
        let mut normalizer = EventNormalizer::default();
        let events = normalizer
            .normalize_frame(&frame(json!({
                "type": "tool_result", "data": {"tool_name": "lookup", "result": {}}
            })))
            .await;
        assert_eq!(events.len(), 1);
        assert!(events[0].tool_call_id().is_some());
        assert_eq!(normalizer.correlation_misses(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_skipped() {
        let mut normalizer = EventNormalizer::default();
        assert!(normalizer.normalize_frame(&SseFrame::data("{oops")).await.is_empty());
        assert_eq!(normalizer.skipped_frames(), 1);
        let events = normalizer
            .normalize_frame(&frame(json!({"type": "message", "content": "still here"})))
            .await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_done_sentinel() {
        let mut normalizer = EventNormalizer::default();
        let events = normalizer.normalize_frame(&SseFrame::data("[DONE]")).await;
        assert_eq!(events, vec![AgentStreamEvent::Done]);
    }

    #[tokio::test]
    async fn test_save_to_memory_uses_result_envelope() {
        let memory = Arc::new(RecordingMemory {
            saved: Mutex::new(Vec::new()),
        });
        let mut normalizer = EventNormalizer::default().with_memory(memory.clone());

        normalizer
            .normalize_frame(&frame(json!({
                "type": "tool_call", "data": {"tool_name": "save_to_memory"}
            })))
            .await;
        let events = normalizer
            .normalize_frame(&frame(json!({
                "type": "tool_result",
                "data": {
                    "tool_name": "save_to_memory",
                    "result": {"parameters": {"key": "home_airport", "value": "JFK"}}
                }
            })))
            .await;

        assert_eq!(
            memory.saved.lock().as_slice(),
            [json!({"key": "home_airport", "value": "JFK"})]
        );
        match &events[0] {
            AgentStreamEvent::ToolComplete { result, .. } => {
                assert_eq!(result, &json!({"success": true, "message": "Saved"}));
            }
            other => panic!("expected ToolComplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_memory_failure_becomes_payload() {
        let mut normalizer = EventNormalizer::default().with_memory(Arc::new(FailingMemory));
        let events = normalizer
            .normalize(WireEvent::ToolComplete {
                id: Some("m1".into()),
                tool_name: "save_to_memory".into(),
                parameters: Some(json!({"key": "k"})),
                result: Value::Null,
            })
            .await;
        match &events[0] {
            AgentStreamEvent::ToolComplete { result, .. } => {
                assert_eq!(
                    result,
                    &json!({"success": false, "message": "memory store unavailable"})
                );
            }
            other => panic!("expected ToolComplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_panel_pushes_side_channel() {
        let mut normalizer = EventNormalizer::default().with_panel(Arc::new(EchoPanel));
        let mut panels = normalizer.subscribe_panels();

        let events = normalizer
            .normalize(WireEvent::ToolResult {
                data: ToolEnvelope {
                    tool_name: "update_panel".into(),
                    parameters: Some(json!({"type": "itinerary", "data": {"days": 3}})),
                    result: None,
                },
            })
            .await;

        let update = panels.try_recv().unwrap();
        assert_eq!(update.panel_type, "itinerary");
        assert_eq!(update.data, json!({"days": 3}));
        match &events[0] {
            AgentStreamEvent::ToolComplete { result, .. } => {
                assert_eq!(result, &json!({"success": true, "panel": "itinerary"}));
            }
            other => panic!("expected ToolComplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_panel_without_type_fails_softly() {
        let mut normalizer = EventNormalizer::default().with_panel(Arc::new(EchoPanel));
        let mut panels = normalizer.subscribe_panels();

        let events = normalizer
            .normalize(WireEvent::ToolComplete {
                id: Some("p1".into()),
                tool_name: "update_panel".into(),
                parameters: Some(json!({"data": {}})),
                result: Value::Null,
            })
            .await;

        assert!(panels.try_recv().is_err());
        match &events[0] {
            AgentStreamEvent::ToolComplete { result, .. } => {
                assert_eq!(result["success"], false);
                assert!(result["message"].as_str().unwrap().contains("panel_type"));
            }
            other => panic!("expected ToolComplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_search_tool_announces_search() {
        let mut normalizer = EventNormalizer::default();
        let events = normalizer
            .normalize(WireEvent::ToolComplete {
                id: Some("s1".into()),
                tool_name: "search_flights".into(),
                parameters: None,
                result: json!({"data": {"searchId": "abc"}}),
            })
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            AgentStreamEvent::SearchAnnounced {
                search_id: "abc".into()
            }
        );
    }

    #[tokio::test]
    async fn test_flat_reasoning_events() {
        let mut normalizer = EventNormalizer::default();
        let events = normalizer
            .normalize(WireEvent::ReasoningProgress {
                content: "Comparing".into(),
                tokens: Some(12),
            })
            .await;
        assert_eq!(
            events,
            vec![AgentStreamEvent::ReasoningProgress {
                text: "Comparing".into(),
                tokens: Some(12)
            }]
        );
    }
}

//! Live reply state: the growing text of one turn and its parsed document.

use tern_document::{Document, DocumentParser};
use tern_wire::{AgentStreamEvent, TurnBuffer};

/// One assistant reply as it streams in.
///
/// The text only grows, so the document is simply re-parsed from the full
/// text whenever a delta lands. Events that do not touch the text leave the
/// document alone.
#[derive(Debug, Default)]
pub struct LiveReply {
    buffer: TurnBuffer,
    parser: DocumentParser,
    document: Document,
}

impl LiveReply {
    pub fn new(parser: DocumentParser) -> Self {
        Self {
            buffer: TurnBuffer::new(),
            parser,
            document: Document::default(),
        }
    }

    /// Fold an event into the reply.
    ///
    /// Returns the re-parsed document when the text changed.
    pub fn apply(&mut self, event: &AgentStreamEvent) -> Option<&Document> {
        if !self.buffer.process_event(event) {
            return None;
        }
        self.document = self.parser.parse(self.buffer.text());
        Some(&self.document)
    }

    /// The latest parsed document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The accumulated turn (text, completed tools, errors, search ids)
    pub fn buffer(&self) -> &TurnBuffer {
        &self.buffer
    }

    /// Whether the turn has ended
    pub fn is_done(&self) -> bool {
        self.buffer.is_done()
    }

    /// Final parse of the whole reply; nothing is held back.
    pub fn finish(self) -> (Document, TurnBuffer) {
        let document = self.parser.parse_complete(self.buffer.text());
        (document, self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tern_document::DocumentNode;

    fn delta(text: &str) -> AgentStreamEvent {
        AgentStreamEvent::MessageDelta {
            delta: text.to_string(),
        }
    }

    #[test]
    fn test_reparse_only_on_text_growth() {
        let mut reply = LiveReply::default();
        assert!(reply.apply(&delta("Hello ")).is_some());
        assert!(
            reply
                .apply(&AgentStreamEvent::Status {
                    message: "Working".into()
                })
                .is_none()
        );
        assert!(reply.apply(&delta("")).is_none());
        assert_eq!(reply.document().plain_text(), "Hello ");
    }

    #[test]
    fn test_partial_directive_resolves_when_completed() {
        let mut reply = LiveReply::default();
        reply.apply(&delta("Checking. {% status \"Search"));
        assert_eq!(reply.document().len(), 1);

        let doc = reply.apply(&delta("ing flights\" %}")).unwrap();
        assert_eq!(
            doc.nodes[1],
            DocumentNode::Status {
                content: "Searching flights".into()
            }
        );
    }

    #[test]
    fn test_finish_attaches_trailing_result() {
        let mut reply = LiveReply::default();
        reply.apply(&delta(r#"{% search_flights_start "Searching" %}"#));
        reply.apply(&delta(r#"{% search_flights_complete "Found 2" %}"#));
        reply.apply(&delta(r#"{"searchId": "s-1"}"#));
        reply.apply(&AgentStreamEvent::SearchAnnounced {
            search_id: "s-1".into(),
        });
        reply.apply(&AgentStreamEvent::Done);
        assert!(reply.is_done());

        let (document, buffer) = reply.finish();
        let tool = document.find_tool("search_flights").unwrap();
        assert!(tool.is_complete);
        assert_eq!(tool.result_data, Some(json!({"searchId": "s-1"})));
        assert_eq!(buffer.search_ids(), ["s-1".to_string()]);
    }
}

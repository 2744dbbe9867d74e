//! Request and response types for the travel backend

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role of a message in the conversation history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prior message sent along with a new turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Image attached to a user message (base64 encoded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub data: String,
    pub mime_type: String,
}

/// Text document attached to a user message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttachment {
    pub name: String,
    pub content: String,
}

/// Body of the stream endpoint POST
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_history: Vec<ConversationMessage>,
    #[serde(default)]
    pub memories: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageAttachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<DocumentAttachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<serde_json::Value>,
}

impl StreamRequest {
    /// Create a request for a single message with no history
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the conversation history
    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.conversation_history = history;
        self
    }

    /// Attach an image
    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.get_or_insert_with(Vec::new).push(image);
        self
    }

    /// Attach a document
    pub fn with_document(mut self, document: DocumentAttachment) -> Self {
        self.documents.get_or_insert_with(Vec::new).push(document);
        self
    }
}

/// Lifecycle status reported by the search results endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStatus {
    Searching,
    Completed,
    Failed,
    Expired,
}

/// Progress block of a poll response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchProgress {
    pub status: SearchStatus,
    #[serde(default)]
    pub gates_queried: u32,
    #[serde(default)]
    pub gates_completed: u32,
    #[serde(default, alias = "percent")]
    pub percent_complete: f64,
}

impl SearchProgress {
    /// Progress of a search that has just been announced
    pub fn searching() -> Self {
        Self {
            status: SearchStatus::Searching,
            gates_queried: 0,
            gates_completed: 0,
            percent_complete: 0.0,
        }
    }
}

/// A single flight offer
///
/// Only the fields the runtime acts on are typed; everything else the
/// providers send is kept verbatim in `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flight {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_link: Option<String>,
    #[serde(flatten)]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl Flight {
    /// Create a flight with just an id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            booking_url: None,
            deep_link: None,
            details: serde_json::Map::new(),
        }
    }

    /// URL to fall back to when the backend cannot produce a booking link
    pub fn fallback_url(&self) -> Option<&str> {
        self.booking_url.as_deref().or(self.deep_link.as_deref())
    }
}

/// Response of the search results endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub status: SearchProgress,
    #[serde(default)]
    pub new_flights: Vec<Flight>,
    #[serde(default)]
    pub pricing_tokens: HashMap<String, String>,
    #[serde(default)]
    pub has_more_results: bool,
    /// Milliseconds the backend asks us to wait before polling again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_poll_after: Option<u64>,
}

/// Body posted back to the conversation once a search completes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub search_id: String,
    pub tool_name: String,
    pub data: serde_json::Value,
    pub message: String,
}

/// Body of the booking URL request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub search_id: String,
    /// The per-flight pricing token
    pub terms_url: String,
}

/// Response of the booking URL request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub booking_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_request_skips_absent_attachments() {
        let req = StreamRequest::new("Find me a flight to Lisbon")
            .with_history(vec![ConversationMessage::user("hi")]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["message"], "Find me a flight to Lisbon");
        assert_eq!(json["conversationHistory"][0]["role"], "user");
        assert!(json.get("images").is_none());
        assert!(json.get("credentials").is_none());
    }

    #[test]
    fn test_poll_response_parses_camel_case() {
        let json = serde_json::json!({
            "status": {"status": "searching", "gatesQueried": 8, "gatesCompleted": 3, "percentComplete": 37.5},
            "newFlights": [{"id": "f1", "price": 120, "deepLink": "https://air.example/f1"}],
            "pricingTokens": {"f1": "tok-1"},
            "hasMoreResults": true,
            "nextPollAfter": 2500
        });
        let resp: PollResponse = serde_json::from_value(json).unwrap();
        assert_eq!(resp.status.status, SearchStatus::Searching);
        assert_eq!(resp.status.gates_completed, 3);
        assert_eq!(resp.new_flights.len(), 1);
        assert_eq!(resp.new_flights[0].details["price"], 120);
        assert_eq!(resp.new_flights[0].fallback_url(), Some("https://air.example/f1"));
        assert_eq!(resp.pricing_tokens["f1"], "tok-1");
        assert_eq!(resp.next_poll_after, Some(2500));
    }

    #[test]
    fn test_poll_response_defaults() {
        let json = serde_json::json!({"status": {"status": "completed"}});
        let resp: PollResponse = serde_json::from_value(json).unwrap();
        assert!(resp.new_flights.is_empty());
        assert!(!resp.has_more_results);
        assert_eq!(resp.next_poll_after, None);
    }

    #[test]
    fn test_flight_prefers_booking_url() {
        let mut flight = Flight::new("f2");
        flight.deep_link = Some("https://deep".into());
        flight.booking_url = Some("https://book".into());
        assert_eq!(flight.fallback_url(), Some("https://book"));
    }

    #[test]
    fn test_booking_request_field_names() {
        let req = BookingRequest {
            search_id: "abc".into(),
            terms_url: "tok".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, serde_json::json!({"searchId": "abc", "termsUrl": "tok"}));
    }
}

//! tern-wire: wire protocol for the travel agent backend
//!
//! This crate decodes the agent's server-sent event stream (both the flat and
//! the enveloped backend dialects), defines the normalized event vocabulary the
//! rest of the system consumes, and provides the HTTP client for the stream,
//! search, completion-report and booking endpoints.

pub mod backend;
pub mod dialect;
pub mod error;
pub mod stream;
pub mod types;

pub use backend::{BackendConfig, HttpBackend};
pub use dialect::{SseFrame, WireEvent};
pub use error::{Error, Result};
pub use stream::{AgentStreamEvent, PanelUpdate, TurnBuffer};
pub use types::*;

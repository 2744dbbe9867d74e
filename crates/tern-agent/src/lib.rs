//! tern-agent: runtime for the travel agent's reply stream
//!
//! This crate turns the backend's event stream into normalized events (pairing
//! tool starts with their completions and running the memory and panel
//! side-effects), keeps the growing reply text parsed into a document, and
//! drives progressive flight searches to completion.

pub mod collaborator;
pub mod conversation;
pub mod correlator;
pub mod error;
pub mod handle;
pub mod normalizer;
pub mod search;
pub mod transport;

pub use collaborator::{MemoryCollaborator, PanelCollaborator};
pub use conversation::LiveReply;
pub use correlator::{Correlation, ToolCallCorrelator};
pub use error::{Error, Result};
pub use handle::TurnHandle;
pub use normalizer::{EventNormalizer, NormalizerConfig};
pub use search::{
    BookingDesk, PollOutcome, SearchBackend, SearchConfig, SearchEvent, SearchOrchestrator,
    SearchSession, SessionState, UrlOpener,
};
pub use transport::{AgentEventStream, HttpTransport, RetryConfig, StreamTransport, TurnRunner};

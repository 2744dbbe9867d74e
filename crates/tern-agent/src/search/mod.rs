//! Progressive flight search
//!
//! A search is announced by the agent and then driven here: the orchestrator
//! polls the results endpoint until the backend says it is done, keeps the
//! accumulated flights and pricing tokens, and reports the aggregate back to
//! the conversation once. The booking desk turns a pricing token into a
//! bookable URL.

mod backend;
mod booking;
mod orchestrator;
mod session;

pub use backend::SearchBackend;
pub use booking::{BookingDesk, UrlOpener};
pub use orchestrator::{SearchConfig, SearchEvent, SearchOrchestrator};
pub use session::{PollOutcome, SearchSession, SessionState};

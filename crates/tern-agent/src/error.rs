//! Error types for tern-agent

use thiserror::Error;

/// Result type alias using tern-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the agent runtime
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] tern_wire::Error),

    /// Booking was requested for a flight that has no pricing token
    #[error("No pricing token for flight {flight_id}; it cannot be booked yet")]
    MissingPricingToken { flight_id: String },

    /// A booking request for this flight is already running
    #[error("A booking request for flight {flight_id} is already in progress")]
    BookingInProgress { flight_id: String },

    /// No search session has been started
    #[error("No search session is active")]
    NoSearch,

    /// A side-effect collaborator failed
    #[error("{0}")]
    Collaborator(String),

    /// Tool parameters did not match what the collaborator expects
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl Error {
    /// Check if this error means the search is gone for good
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Wire(e) => e.is_not_found(),
            _ => false,
        }
    }
}

//! Search session state

use serde::Serialize;
use serde_json::json;
use std::{collections::HashMap, time::Duration};
use tern_wire::{CompletionReport, Flight, PollResponse, SearchProgress, SearchStatus};

/// Lifecycle of a search session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Not polling; either never started or cancelled
    Idle,
    Searching,
    Completed,
    Failed,
    Expired,
}

impl SessionState {
    /// Whether no further polling will happen
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Expired
        )
    }
}

/// What to do after a poll has been applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Poll again after the delay
    Continue(Duration),
    Completed,
    Failed(String),
    Expired,
}

/// Accumulated state of one search
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSession {
    pub search_id: String,
    pub state: SessionState,
    pub progress: SearchProgress,
    /// Flights in arrival order, unique by id
    pub flights: Vec<Flight>,
    pub pricing_tokens: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchSession {
    /// A session that is about to issue its first poll
    pub fn new(search_id: impl Into<String>) -> Self {
        Self {
            search_id: search_id.into(),
            state: SessionState::Searching,
            progress: SearchProgress::searching(),
            flights: Vec::new(),
            pricing_tokens: HashMap::new(),
            error: None,
        }
    }

    /// Merge one poll response and decide what happens next.
    ///
    /// Flights already held are skipped. `default_delay` applies when the
    /// backend does not say when to poll again.
    pub fn apply_poll(&mut self, response: PollResponse, default_delay: Duration) -> PollOutcome {
        for flight in response.new_flights {
            if self.flights.iter().any(|f| f.id == flight.id) {
                tracing::debug!(flight_id = %flight.id, "skipping duplicate flight");
                continue;
            }
            self.flights.push(flight);
        }
        self.pricing_tokens.extend(response.pricing_tokens);
        self.progress = response.status;

        match self.progress.status {
            SearchStatus::Completed => self.complete(),
            SearchStatus::Failed => {
                let message = "The flight search failed".to_string();
                self.fail(message.clone());
                PollOutcome::Failed(message)
            }
            SearchStatus::Expired => {
                self.state = SessionState::Expired;
                self.error = Some("The flight search has expired".to_string());
                PollOutcome::Expired
            }
            SearchStatus::Searching if !response.has_more_results => self.complete(),
            SearchStatus::Searching => PollOutcome::Continue(
                response
                    .next_poll_after
                    .map(Duration::from_millis)
                    .unwrap_or(default_delay),
            ),
        }
    }

    fn complete(&mut self) -> PollOutcome {
        self.state = SessionState::Completed;
        self.progress.status = SearchStatus::Completed;
        PollOutcome::Completed
    }

    /// Mark the session failed with a user-visible message
    pub fn fail(&mut self, message: impl Into<String>) {
        self.state = SessionState::Failed;
        self.error = Some(message.into());
    }

    /// Look up an accumulated flight
    pub fn flight(&self, flight_id: &str) -> Option<&Flight> {
        self.flights.iter().find(|f| f.id == flight_id)
    }

    /// Pricing token needed to book a flight
    pub fn pricing_token(&self, flight_id: &str) -> Option<&str> {
        self.pricing_tokens.get(flight_id).map(String::as_str)
    }

    /// Body posted back to the conversation once the search completes
    pub fn completion_report(&self, tool_name: &str) -> CompletionReport {
        CompletionReport {
            search_id: self.search_id.clone(),
            tool_name: tool_name.to_string(),
            data: json!({
                "flights": self.flights,
                "pricingTokens": self.pricing_tokens,
                "progress": self.progress,
            }),
            message: format!("Found {} flights", self.flights.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::backend::mock::page;

    const DEFAULT: Duration = Duration::from_secs(6);

    #[test]
    fn test_more_results_continue_with_backend_delay() {
        let mut session = SearchSession::new("abc");
        let mut response = page(&["f1"], true, SearchStatus::Searching);
        response.next_poll_after = Some(2500);

        assert_eq!(
            session.apply_poll(response, DEFAULT),
            PollOutcome::Continue(Duration::from_millis(2500))
        );
        assert_eq!(session.state, SessionState::Searching);
        assert_eq!(session.pricing_token("f1"), Some("token-f1"));
    }

    #[test]
    fn test_missing_delay_uses_default() {
        let mut session = SearchSession::new("abc");
        let mut response = page(&[], true, SearchStatus::Searching);
        response.next_poll_after = None;
        assert_eq!(
            session.apply_poll(response, DEFAULT),
            PollOutcome::Continue(DEFAULT)
        );
    }

    #[test]
    fn test_no_more_results_completes() {
        let mut session = SearchSession::new("abc");
        let outcome = session.apply_poll(page(&["f1"], false, SearchStatus::Searching), DEFAULT);
        assert_eq!(outcome, PollOutcome::Completed);
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.progress.status, SearchStatus::Completed);
    }

    #[test]
    fn test_duplicate_flights_are_skipped() {
        let mut session = SearchSession::new("abc");
        session.apply_poll(page(&["f1", "f2"], true, SearchStatus::Searching), DEFAULT);
        session.apply_poll(page(&["f2", "f3"], true, SearchStatus::Searching), DEFAULT);
        let ids: Vec<_> = session.flights.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, ["f1", "f2", "f3"]);
    }

    #[test]
    fn test_backend_expired_is_terminal() {
        let mut session = SearchSession::new("abc");
        let outcome = session.apply_poll(page(&[], true, SearchStatus::Expired), DEFAULT);
        assert_eq!(outcome, PollOutcome::Expired);
        assert!(session.state.is_terminal());
        assert!(session.error.is_some());
    }

    #[test]
    fn test_completion_report_body() {
        let mut session = SearchSession::new("abc");
        session.apply_poll(page(&["f1", "f2"], false, SearchStatus::Completed), DEFAULT);

        let report = session.completion_report("search_flights");
        assert_eq!(report.search_id, "abc");
        assert_eq!(report.tool_name, "search_flights");
        assert_eq!(report.message, "Found 2 flights");
        assert_eq!(report.data["flights"][1]["id"], "f2");
        assert_eq!(report.data["pricingTokens"]["f1"], "token-f1");
        assert_eq!(report.data["progress"]["status"], "completed");
    }
}

//! Pairing of tool starts with their completions
//!
//! The enveloped backend dialect reports `tool_call` and `tool_result` without
//! an identifier. The correlator mints one when a call starts and hands it back
//! when a result for the same tool name arrives, so every start/complete pair
//! shares an id.
//!
//! Matching is by tool name only, oldest pending call first. Two concurrent
//! invocations of the same tool are paired in arrival order, which is only right
//! if the backend finishes them in that order.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

/// Seconds per coarse timestamp bucket in pending keys
const BUCKET_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PendingKey {
    tool_name: String,
    bucket: i64,
}

#[derive(Debug, Clone)]
struct PendingCall {
    id: String,
    seq: u64,
}

/// Result of resolving a completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    pub id: String,
    /// False when no pending start existed and the id was freshly minted
    pub matched: bool,
}

/// Pending tool calls for one conversation turn
#[derive(Debug, Default)]
pub struct ToolCallCorrelator {
    pending: HashMap<PendingKey, VecDeque<PendingCall>>,
    next_seq: u64,
    misses: u64,
}

impl ToolCallCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh tool call identifier
    pub fn mint_id() -> String {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    }

    /// Record a tool start and return its new identifier
    pub fn begin(&mut self, tool_name: &str) -> String {
        self.begin_at(tool_name, Utc::now())
    }

    /// Record a tool start observed at `at`
    pub fn begin_at(&mut self, tool_name: &str, at: DateTime<Utc>) -> String {
        let id = Self::mint_id();
        let key = PendingKey {
            tool_name: tool_name.to_string(),
            bucket: at.timestamp().div_euclid(BUCKET_SECS),
        };
        self.pending.entry(key).or_default().push_back(PendingCall {
            id: id.clone(),
            seq: self.next_seq,
        });
        self.next_seq += 1;
        id
    }

    /// Resolve a completion for `tool_name`, consuming the oldest pending start.
    ///
    /// When nothing is pending a fresh id is minted and the miss is counted.
    pub fn complete(&mut self, tool_name: &str) -> Correlation {
        let oldest = self
            .pending
            .iter()
            .filter(|(key, _)| key.tool_name == tool_name)
            .filter_map(|(key, calls)| calls.front().map(|call| (key.clone(), call.seq)))
            .min_by_key(|(_, seq)| *seq)
            .map(|(key, _)| key);

        if let Some(key) = oldest {
            if let Some(calls) = self.pending.get_mut(&key) {
                if let Some(call) = calls.pop_front() {
                    if calls.is_empty() {
                        self.pending.remove(&key);
                    }
                    return Correlation {
                        id: call.id,
                        matched: true,
                    };
                }
            }
        }

        self.misses += 1;
        tracing::warn!(
            tool_name,
            "tool result without a pending tool call; minting a new id"
        );
        Correlation {
            id: Self::mint_id(),
            matched: false,
        }
    }

    /// Id of the oldest pending call for `tool_name`, without consuming it
    pub fn current(&self, tool_name: &str) -> Option<&str> {
        self.pending
            .iter()
            .filter(|(key, _)| key.tool_name == tool_name)
            .filter_map(|(_, calls)| calls.front())
            .min_by_key(|call| call.seq)
            .map(|call| call.id.as_str())
    }

    /// Number of starts still waiting for a completion
    pub fn pending(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    /// Number of completions that had no pending start
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Drop all pending calls (end of turn)
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_and_complete_share_id() {
        let mut correlator = ToolCallCorrelator::new();
        let id = correlator.begin("search_entities");
        assert_eq!(correlator.pending(), 1);

        let correlation = correlator.complete("search_entities");
        assert_eq!(correlation.id, id);
        assert!(correlation.matched);
        assert_eq!(correlator.pending(), 0);
        assert_eq!(correlator.misses(), 0);
    }

    #[test]
    fn test_unrelated_tools_do_not_cross() {
        let mut correlator = ToolCallCorrelator::new();
        let search = correlator.begin("search_entities");
        let memory = correlator.begin("save_to_memory");

        assert_eq!(correlator.complete("save_to_memory").id, memory);
        assert_eq!(correlator.complete("search_entities").id, search);
    }

    #[test]
    fn test_miss_mints_fresh_id() {
        let mut correlator = ToolCallCorrelator::new();
        let correlation = correlator.complete("update_panel");
        assert!(!correlation.matched);
        assert!(correlation.id.starts_with("call_"));
        assert_eq!(correlator.misses(), 1);
    }

    // Concurrent calls to the same tool pair oldest-first. This is only correct
    // if the backend never runs the same tool twice at once.
    #[test]
    fn test_same_name_concurrent_calls_pair_oldest_first() {
        let mut correlator = ToolCallCorrelator::new();
        let first = correlator.begin("search_flights");
        let second = correlator.begin("search_flights");

        assert_eq!(correlator.complete("search_flights").id, first);
        assert_eq!(correlator.complete("search_flights").id, second);
    }

    #[test]
    fn test_oldest_first_across_time_buckets() {
        let mut correlator = ToolCallCorrelator::new();
        let early = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 5, 1, 12, 5, 0).unwrap();

        let first = correlator.begin_at("search_flights", late);
        let second = correlator.begin_at("search_flights", early);

        // Insertion order wins, not timestamp order.
        assert_eq!(correlator.complete("search_flights").id, first);
        assert_eq!(correlator.complete("search_flights").id, second);
    }

    #[test]
    fn test_current_does_not_consume() {
        let mut correlator = ToolCallCorrelator::new();
        assert_eq!(correlator.current("generate_image"), None);
        let id = correlator.begin("generate_image");
        assert_eq!(correlator.current("generate_image"), Some(id.as_str()));
        assert_eq!(correlator.pending(), 1);
    }

    #[test]
    fn test_clear_drops_pending() {
        let mut correlator = ToolCallCorrelator::new();
        correlator.begin("a");
        correlator.begin("b");
        correlator.clear();
        assert_eq!(correlator.pending(), 0);
    }
}

//! Search polling loop

use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tern_wire::{CompletionReport, SearchProgress};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{
    backend::SearchBackend,
    session::{PollOutcome, SearchSession, SessionState},
};

/// Search orchestrator configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Delay between polls when the backend does not supply one
    pub poll_interval: Duration,
    /// Give up after this many consecutive non-404 poll failures.
    /// `None` retries until cancelled.
    pub max_consecutive_failures: Option<u32>,
    /// Tool name carried by the completion report
    pub report_tool_name: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(6),
            max_consecutive_failures: None,
            report_tool_name: "search_flights".to_string(),
        }
    }
}

/// Progress notifications published while a search runs
#[derive(Debug, Clone, PartialEq)]
pub enum SearchEvent {
    /// A poll was merged
    Progress {
        search_id: String,
        progress: SearchProgress,
        new_flights: usize,
        total_flights: usize,
    },
    Completed {
        search_id: String,
        total_flights: usize,
    },
    Failed {
        search_id: String,
        message: String,
    },
    Expired {
        search_id: String,
    },
    Cancelled {
        search_id: String,
    },
}

impl SearchEvent {
    /// Whether the search will not publish anything further
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SearchEvent::Progress { .. })
    }
}

struct ActiveLoop {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Drives one search at a time from announcement to a terminal state.
///
/// Starting a search cancels whatever loop was running, so at most one poll
/// is ever scheduled. Cancellation is independent of any agent turn.
pub struct SearchOrchestrator {
    backend: Arc<dyn SearchBackend>,
    config: SearchConfig,
    session: Arc<Mutex<Option<SearchSession>>>,
    active: Mutex<Option<ActiveLoop>>,
    events: broadcast::Sender<SearchEvent>,
}

impl SearchOrchestrator {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SearchConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            backend,
            config,
            session: Arc::new(Mutex::new(None)),
            active: Mutex::new(None),
            events,
        }
    }

    /// The backend this orchestrator polls
    pub fn backend(&self) -> Arc<dyn SearchBackend> {
        Arc::clone(&self.backend)
    }

    /// Subscribe to search progress
    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.events.subscribe()
    }

    /// Start polling `search_id`. The first poll is issued immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, search_id: impl Into<String>) {
        let search_id = search_id.into();
        let cancel = CancellationToken::new();

        {
            // Swap under the session lock so a cancelled loop can never
            // write into the new session.
            let mut session = self.session.lock();
            if let Some(previous) = self.active.lock().take() {
                previous.cancel.cancel();
            }
            *session = Some(SearchSession::new(&search_id));
        }

        tracing::debug!(%search_id, "starting flight search");
        let poll_loop = PollLoop {
            backend: Arc::clone(&self.backend),
            config: self.config.clone(),
            session: Arc::clone(&self.session),
            events: self.events.clone(),
            search_id,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(poll_loop.run());

        *self.active.lock() = Some(ActiveLoop {
            cancel,
            task: Some(task),
        });
    }

    /// Stop polling and return to idle, keeping accumulated flights.
    ///
    /// Returns `false` when no search was in progress.
    pub fn cancel(&self) -> bool {
        let mut session = self.session.lock();
        if let Some(active) = self.active.lock().take() {
            active.cancel.cancel();
        }

        match session.as_mut() {
            Some(s) if s.state == SessionState::Searching => {
                s.state = SessionState::Idle;
                let _ = self.events.send(SearchEvent::Cancelled {
                    search_id: s.search_id.clone(),
                });
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Option<SearchSession> {
        self.session.lock().clone()
    }

    /// Current session state (`Idle` when no search was started)
    pub fn state(&self) -> SessionState {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(SessionState::Idle)
    }

    /// Wait for the running loop to finish and return the final session
    pub async fn wait(&self) -> Option<SearchSession> {
        let task = self.active.lock().as_mut().and_then(|a| a.task.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("search loop ended abnormally: {}", e);
            }
        }
        self.session()
    }
}

impl Drop for SearchOrchestrator {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

struct PollLoop {
    backend: Arc<dyn SearchBackend>,
    config: SearchConfig,
    session: Arc<Mutex<Option<SearchSession>>>,
    events: broadcast::Sender<SearchEvent>,
    search_id: String,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        let mut failures = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.backend.poll(&self.search_id) => result,
            };

            let delay = match result {
                Ok(response) => {
                    failures = 0;
                    let new_flights = response.new_flights.len();
                    // The report is snapshotted together with the completing
                    // merge, so a later cancel cannot drop it.
                    let merged = self.with_session(|s| {
                        let outcome = s.apply_poll(response, self.config.poll_interval);
                        let report = matches!(outcome, PollOutcome::Completed)
                            .then(|| s.completion_report(&self.config.report_tool_name));
                        (outcome, report, s.progress.clone(), s.flights.len())
                    });
                    let Some((outcome, report, progress, total_flights)) = merged else {
                        return;
                    };

                    self.publish(SearchEvent::Progress {
                        search_id: self.search_id.clone(),
                        progress,
                        new_flights,
                        total_flights,
                    });

                    match outcome {
                        PollOutcome::Continue(delay) => delay,
                        PollOutcome::Completed => {
                            self.publish(SearchEvent::Completed {
                                search_id: self.search_id.clone(),
                                total_flights,
                            });
                            if let Some(report) = report {
                                self.report(report).await;
                            }
                            return;
                        }
                        PollOutcome::Failed(message) => {
                            self.publish(SearchEvent::Failed {
                                search_id: self.search_id.clone(),
                                message,
                            });
                            return;
                        }
                        PollOutcome::Expired => {
                            self.publish(SearchEvent::Expired {
                                search_id: self.search_id.clone(),
                            });
                            return;
                        }
                    }
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(search_id = %self.search_id, "search not found: {}", e);
                    self.give_up("The flight search is no longer available".to_string());
                    return;
                }
                Err(e) => {
                    failures += 1;
                    if let Some(max) = self.config.max_consecutive_failures {
                        if failures >= max {
                            tracing::warn!(
                                search_id = %self.search_id,
                                "giving up after {} consecutive poll failures: {}",
                                failures,
                                e
                            );
                            self.give_up(format!("Search polling failed: {}", e));
                            return;
                        }
                    }
                    tracing::warn!(
                        search_id = %self.search_id,
                        "poll failed (attempt {}): {}. Retrying in {:?}",
                        failures,
                        e,
                        self.config.poll_interval
                    );
                    self.config.poll_interval
                }
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Run `f` on the session unless this loop has been superseded
    fn with_session<T>(&self, f: impl FnOnce(&mut SearchSession) -> T) -> Option<T> {
        let mut guard = self.session.lock();
        if self.cancel.is_cancelled() {
            return None;
        }
        guard.as_mut().map(f)
    }

    fn give_up(&self, message: String) {
        if self.with_session(|s| s.fail(message.clone())).is_some() {
            self.publish(SearchEvent::Failed {
                search_id: self.search_id.clone(),
                message,
            });
        }
    }

    fn publish(&self, event: SearchEvent) {
        // No subscribers is fine; the session snapshot has the same state.
        let _ = self.events.send(event);
    }

    async fn report(&self, report: CompletionReport) {
        match self.backend.report_completion(&report).await {
            Ok(()) => tracing::debug!(search_id = %self.search_id, "completion reported"),
            Err(e) => tracing::error!(
                search_id = %self.search_id,
                "failed to report search completion: {}",
                e
            ),
        }
    }
}

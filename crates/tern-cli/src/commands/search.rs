//! `tern search`: drive a flight search to completion and optionally book

use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tern_agent::{
    BookingDesk, SearchBackend, SearchEvent, SearchOrchestrator, SearchSession, SessionState,
    UrlOpener,
};
use tokio::sync::broadcast::error::RecvError;

use crate::config::Config;

const PRINTER_GRACE: Duration = Duration::from_secs(1);

/// Prints booking URLs instead of launching a browser
pub struct ConsoleOpener;

#[async_trait]
impl UrlOpener for ConsoleOpener {
    async fn open(&self, url: &str) -> tern_agent::Result<()> {
        println!("Open to book: {}", url);
        Ok(())
    }
}

/// One-line summary of a session
pub fn summary(session: &SearchSession) -> String {
    let state = match session.state {
        SessionState::Idle => "cancelled",
        SessionState::Searching => "searching",
        SessionState::Completed => "completed",
        SessionState::Failed => "failed",
        SessionState::Expired => "expired",
    };
    let mut line = format!(
        "Search {} {}: {} flights, {} bookable",
        session.search_id,
        state,
        session.flights.len(),
        session.pricing_tokens.len()
    );
    if let Some(ref error) = session.error {
        line.push_str(&format!(" ({})", error));
    }
    line
}

/// Print progress events to stderr until the search ends
async fn report_progress(mut events: tokio::sync::broadcast::Receiver<SearchEvent>) {
    loop {
        match events.recv().await {
            Ok(SearchEvent::Progress {
                progress,
                new_flights,
                total_flights,
                ..
            }) => {
                eprintln!(
                    "[search {:.0}%: {} gates of {}, +{} flights, {} total]",
                    progress.percent_complete,
                    progress.gates_completed,
                    progress.gates_queried,
                    new_flights,
                    total_flights
                );
            }
            Ok(event) if event.is_terminal() => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "search progress printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Poll `search_id` until it ends or Ctrl-C, returning the final session
pub async fn follow(
    config: &Config,
    backend: Arc<dyn SearchBackend>,
    search_id: &str,
) -> anyhow::Result<(SearchOrchestrator, SearchSession)> {
    let orchestrator = SearchOrchestrator::new(backend, config.search_config());
    let printer = tokio::spawn(report_progress(orchestrator.subscribe()));

    orchestrator.start(search_id);
    let session = tokio::select! {
        session = orchestrator.wait() => session,
        _ = tokio::signal::ctrl_c() => {
            orchestrator.cancel();
            orchestrator.session()
        }
    };
    // The printer stops on the terminal event; don't hang if there was none.
    if tokio::time::timeout(PRINTER_GRACE, printer).await.is_err() {
        tracing::debug!("search ended without a terminal progress event");
    }

    let session = session.ok_or(tern_agent::Error::NoSearch)?;
    println!("{}", summary(&session));
    Ok((orchestrator, session))
}

pub async fn run(
    config: &Config,
    backend: Arc<dyn SearchBackend>,
    search_id: &str,
    book: Option<&str>,
) -> anyhow::Result<()> {
    let (orchestrator, session) = follow(config, backend, search_id).await?;

    if let Some(flight_id) = book {
        let desk = BookingDesk::new(orchestrator.backend(), Arc::new(ConsoleOpener));
        desk.book(&session, flight_id).await?;
    }
    Ok(())
}

//! Transport abstraction for running agent turns

use std::{pin::Pin, sync::Arc, time::Duration};

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use tern_wire::{AgentStreamEvent, HttpBackend, StreamRequest, stream::FrameStream};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::{handle::TurnHandle, normalizer::EventNormalizer};

/// Retry configuration for opening the agent stream
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// A stream of normalized agent events
pub type AgentEventStream = Pin<Box<dyn Stream<Item = AgentStreamEvent> + Send>>;

/// Source of raw SSE frames for one turn
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Open the agent stream for a turn
    async fn open(&self, request: &StreamRequest) -> tern_wire::Result<FrameStream>;
}

/// Transport backed by the HTTP stream endpoint
#[derive(Clone)]
pub struct HttpTransport {
    backend: HttpBackend,
}

impl HttpTransport {
    pub fn new(backend: HttpBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> tern_wire::Result<FrameStream> {
        self.backend.stream_turn(request)
    }
}

/// Runs turns over a transport, normalizing frames as they arrive.
///
/// A turn ends after `Done` (the sentinel or a clean end of stream), after an
/// `Error` event for a transport failure, or after `Error { "Cancelled" }`
/// when the cancellation token fires. Undecodable frames are skipped.
#[derive(Clone)]
pub struct TurnRunner {
    transport: Arc<dyn StreamTransport>,
    retry_config: RetryConfig,
}

impl TurnRunner {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            transport,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Stream the normalized events of one turn.
    ///
    /// Failures before the first frame are retried when the error is
    /// retryable. Once frames have arrived a failure ends the turn, since the
    /// backend would replay text the caller already holds.
    pub fn run(
        &self,
        request: StreamRequest,
        mut normalizer: EventNormalizer,
        cancel: CancellationToken,
    ) -> AgentEventStream {
        let transport = Arc::clone(&self.transport);
        let retry_config = self.retry_config.clone();

        Box::pin(stream! {
            let mut attempt = 0u32;

            'turn: loop {
                if cancel.is_cancelled() {
                    yield AgentStreamEvent::Error { message: "Cancelled".to_string() };
                    return;
                }

                let mut frames = match transport.open(&request).await {
                    Ok(frames) => frames,
                    Err(e) => {
                        if e.is_retryable() && attempt < retry_config.max_retries {
                            let delay = retry_config.delay_for_attempt(attempt);
                            tracing::warn!(
                                "Opening agent stream failed (attempt {}/{}): {}. Retrying in {:?}...",
                                attempt + 1,
                                retry_config.max_retries + 1,
                                e,
                                delay
                            );
                            attempt += 1;
                            tokio::select! {
                                _ = cancel.cancelled() => {}
                                _ = tokio::time::sleep(delay) => {}
                            }
                            continue 'turn;
                        }
                        yield AgentStreamEvent::Error { message: e.to_string() };
                        return;
                    }
                };

                let mut received = false;
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        item = frames.next() => Some(item),
                    };

                    let frame = match next {
                        None => {
                            normalizer.end_turn();
                            yield AgentStreamEvent::Error { message: "Cancelled".to_string() };
                            return;
                        }
                        Some(None) => {
                            tracing::debug!("agent stream closed without a done sentinel");
                            normalizer.end_turn();
                            yield AgentStreamEvent::Done;
                            return;
                        }
                        Some(Some(Ok(frame))) => frame,
                        Some(Some(Err(e))) => {
                            if !received && e.is_retryable() && attempt < retry_config.max_retries {
                                let delay = retry_config.delay_for_attempt(attempt);
                                tracing::warn!(
                                    "Agent stream failed before any event (attempt {}/{}): {}. Retrying in {:?}...",
                                    attempt + 1,
                                    retry_config.max_retries + 1,
                                    e,
                                    delay
                                );
                                attempt += 1;
                                tokio::select! {
                                    _ = cancel.cancelled() => {}
                                    _ = tokio::time::sleep(delay) => {}
                                }
                                continue 'turn;
                            }
                            normalizer.end_turn();
                            yield AgentStreamEvent::Error { message: e.to_string() };
                            return;
                        }
                    };

                    received = true;
                    for event in normalizer.normalize_frame(&frame).await {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            normalizer.end_turn();
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Run a turn on a background task, forwarding events over a channel.
    ///
    /// The returned handle aborts the turn; the channel closes once the turn
    /// has ended.
    pub fn spawn(
        &self,
        request: StreamRequest,
        normalizer: EventNormalizer,
    ) -> (mpsc::Receiver<AgentStreamEvent>, TurnHandle) {
        let handle = TurnHandle::new();
        let (tx, rx) = mpsc::channel(256);
        let mut events = self.run(request, normalizer, handle.token());

        let task_handle = handle.clone();
        task_handle.set_running(true);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if tx.send(event).await.is_err() {
                    tracing::debug!("turn receiver dropped, stopping ingestion");
                    break;
                }
            }
            task_handle.set_running(false);
        });

        (rx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::{collections::VecDeque, sync::atomic::{AtomicUsize, Ordering}};
    use tern_wire::SseFrame;

    type Script = Vec<tern_wire::Result<SseFrame>>;

    /// Transport replaying one scripted frame list per open
    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        /// Keep the last script's stream open instead of ending it
        hang: bool,
        opens: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                hang: false,
                opens: AtomicUsize::new(0),
            }
        }

        fn hanging(scripts: Vec<Script>) -> Self {
            Self {
                hang: true,
                ..Self::new(scripts)
            }
        }
    }

    #[async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn open(&self, _request: &StreamRequest) -> tern_wire::Result<FrameStream> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            let script = self.scripts.lock().pop_front().unwrap_or_default();
            let frames = futures::stream::iter(script);
            if self.hang {
                Ok(Box::pin(frames.chain(futures::stream::pending())))
            } else {
                Ok(Box::pin(frames))
            }
        }
    }

    fn frame(data: serde_json::Value) -> tern_wire::Result<SseFrame> {
        Ok(SseFrame::data(data.to_string()))
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    async fn collect(stream: AgentEventStream) -> Vec<AgentStreamEvent> {
        stream.collect().await
    }

    #[test]
    fn test_delay_for_attempt_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_run_stops_at_done_sentinel() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![
            frame(json!({"type": "message", "content": "Hi "})),
            Ok(SseFrame::data("[DONE]")),
            frame(json!({"type": "message", "content": "ignored"})),
        ]]));
        let runner = TurnRunner::new(transport);

        let events = collect(runner.run(
            StreamRequest::new("hello"),
            EventNormalizer::default(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(
            events,
            vec![
                AgentStreamEvent::MessageDelta { delta: "Hi ".into() },
                AgentStreamEvent::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_bad_frame_is_skipped_and_end_of_stream_is_done() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![
            Ok(SseFrame::data("{not json")),
            frame(json!({"type": "tool_call", "data": {"tool_name": "search_entities"}})),
            frame(json!({"type": "message", "content": "..."})),
            frame(json!({"type": "tool_result", "data": {"tool_name": "search_entities", "result": {}}})),
        ]]));
        let runner = TurnRunner::new(transport);

        let events = collect(runner.run(
            StreamRequest::new("hello"),
            EventNormalizer::default(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].tool_call_id(), events[2].tool_call_id());
        assert!(events[0].tool_call_id().is_some());
        assert_eq!(events[3], AgentStreamEvent::Done);
    }

    #[tokio::test]
    async fn test_retry_before_first_frame() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            vec![Err(tern_wire::Error::api(503, "overloaded"))],
            vec![frame(json!({"type": "message", "content": "ok"}))],
        ]));
        let runner = TurnRunner::new(transport.clone()).with_retry_config(fast_retry());

        let events = collect(runner.run(
            StreamRequest::new("hello"),
            EventNormalizer::default(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(transport.opens.load(Ordering::SeqCst), 2);
        assert_eq!(events[0], AgentStreamEvent::MessageDelta { delta: "ok".into() });
    }

    #[tokio::test]
    async fn test_error_after_frames_ends_turn() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![
            frame(json!({"type": "message", "content": "partial"})),
            Err(tern_wire::Error::Sse("connection reset".into())),
        ]]));
        let runner = TurnRunner::new(transport.clone()).with_retry_config(fast_retry());

        let events = collect(runner.run(
            StreamRequest::new("hello"),
            EventNormalizer::default(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[1], AgentStreamEvent::Error { message } if message.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![Err(
            tern_wire::Error::NotFound("no such route".into()),
        )]]));
        let runner = TurnRunner::new(transport.clone()).with_retry_config(fast_retry());

        let events = collect(runner.run(
            StreamRequest::new("hello"),
            EventNormalizer::default(),
            CancellationToken::new(),
        ))
        .await;

        assert_eq!(transport.opens.load(Ordering::SeqCst), 1);
        assert!(matches!(events.as_slice(), [AgentStreamEvent::Error { .. }]));
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_read() {
        let transport = Arc::new(ScriptedTransport::hanging(vec![vec![frame(
            json!({"type": "message", "content": "Thinking about Lisbon"}),
        )]]));
        let runner = TurnRunner::new(transport);
        let cancel = CancellationToken::new();

        let mut events = runner.run(
            StreamRequest::new("hello"),
            EventNormalizer::default(),
            cancel.clone(),
        );

        assert!(matches!(events.next().await, Some(AgentStreamEvent::MessageDelta { .. })));
        cancel.cancel();
        assert_eq!(
            events.next().await,
            Some(AgentStreamEvent::Error {
                message: "Cancelled".into()
            })
        );
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_spawn_forwards_events_and_aborts() {
        let transport = Arc::new(ScriptedTransport::hanging(vec![vec![frame(
            json!({"type": "status", "message": "Searching flights"}),
        )]]));
        let runner = TurnRunner::new(transport);

        let (mut rx, handle) = runner.spawn(StreamRequest::new("hello"), EventNormalizer::default());
        assert!(handle.is_running());
        assert_eq!(
            rx.recv().await,
            Some(AgentStreamEvent::Status {
                message: "Searching flights".into()
            })
        );

        handle.abort();
        assert_eq!(
            rx.recv().await,
            Some(AgentStreamEvent::Error {
                message: "Cancelled".into()
            })
        );
        assert_eq!(rx.recv().await, None);
        assert!(handle.wait_timeout(Duration::from_secs(1)).await);
        assert!(!handle.is_running());
    }
}

//! HTTP client for the travel backend

use async_stream::stream;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};

use crate::{
    dialect::SseFrame,
    error::{Error, Result},
    stream::FrameStream,
    types::{BookingRequest, BookingResponse, CompletionReport, PollResponse, StreamRequest},
};

/// Where the backend lives and how to reach each endpoint
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Root URL, without a trailing slash
    pub base_url: String,
    /// Optional bearer credential
    pub api_key: Option<String>,
    pub stream_path: String,
    /// Search results path; `{search_id}` is substituted
    pub search_results_path: String,
    pub completion_report_path: String,
    pub booking_url_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: None,
            stream_path: "/api/chat/stream".to_string(),
            search_results_path: "/api/flights/search/{search_id}/results".to_string(),
            completion_report_path: "/api/chat/tool-result".to_string(),
            booking_url_path: "/api/flights/booking-url".to_string(),
        }
    }
}

impl BackendConfig {
    /// Create a config for a backend root URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }

    /// Set the bearer credential
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of the stream endpoint
    pub fn stream_url(&self) -> String {
        self.url(&self.stream_path)
    }

    /// URL of the results endpoint for one search
    pub fn search_results_url(&self, search_id: &str) -> String {
        self.url(&self.search_results_path.replace("{search_id}", search_id))
    }

    /// URL of the completion report endpoint
    pub fn completion_report_url(&self) -> String {
        self.url(&self.completion_report_path)
    }

    /// URL of the booking endpoint
    pub fn booking_url(&self) -> String {
        self.url(&self.booking_url_path)
    }
}

/// Travel backend client
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// Create a client for the given backend
    pub fn new(config: BackendConfig) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(Error::InvalidConfig("backend base_url is empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    /// The backend configuration
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Open the agent stream for one turn
    pub fn stream_turn(&self, request: &StreamRequest) -> Result<FrameStream> {
        let builder = self
            .authorize(self.client.post(self.config.stream_url()))
            .header("accept", "text/event-stream")
            .json(request);

        let event_source = EventSource::new(builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(frame_stream(event_source)))
    }

    /// Fetch the next batch of results for a search
    pub async fn poll_search(&self, search_id: &str) -> Result<PollResponse> {
        let response = self
            .authorize(self.client.get(self.config.search_results_url(search_id)))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, text));
        }

        Ok(response.json().await?)
    }

    /// Post the aggregate of a finished search back to the conversation
    pub async fn report_completion(&self, report: &CompletionReport) -> Result<()> {
        let response = self
            .authorize(self.client.post(self.config.completion_report_url()))
            .json(report)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, text));
        }
        Ok(())
    }

    /// Exchange a pricing token for a bookable URL
    pub async fn booking_url(&self, request: &BookingRequest) -> Result<BookingResponse> {
        let response = self
            .authorize(self.client.post(self.config.booking_url()))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, text));
        }

        Ok(response.json().await?)
    }
}

fn frame_stream(mut event_source: EventSource) -> impl futures::Stream<Item = Result<SseFrame>> {
    stream! {
        while let Some(event) = event_source.next().await {
            match event {
                Ok(Event::Open) => {
                    tracing::debug!("agent stream opened");
                }
                Ok(event @ Event::Message(_)) => {
                    yield Ok(SseFrame::from(event));
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    break;
                }
                Err(reqwest_eventsource::Error::InvalidStatusCode(status, response)) => {
                    let text = response.text().await.unwrap_or_default();
                    yield Err(Error::from_status(status, text));
                    break;
                }
                Err(reqwest_eventsource::Error::Transport(e)) => {
                    yield Err(Error::Http(e));
                    break;
                }
                Err(e) => {
                    yield Err(Error::Sse(e.to_string()));
                    break;
                }
            }
        }
        event_source.close();
    }
}

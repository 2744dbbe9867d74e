//! Backend seam for the search endpoints

use async_trait::async_trait;
use tern_wire::{
    BookingRequest, BookingResponse, CompletionReport, HttpBackend, PollResponse, Result,
};

/// The three search-related backend calls
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Fetch the next batch of results for a search
    async fn poll(&self, search_id: &str) -> Result<PollResponse>;

    /// Post the aggregate of a finished search back to the conversation
    async fn report_completion(&self, report: &CompletionReport) -> Result<()>;

    /// Exchange a pricing token for a bookable URL
    async fn booking_url(&self, request: &BookingRequest) -> Result<BookingResponse>;
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn poll(&self, search_id: &str) -> Result<PollResponse> {
        self.poll_search(search_id).await
    }

    async fn report_completion(&self, report: &CompletionReport) -> Result<()> {
        HttpBackend::report_completion(self, report).await
    }

    async fn booking_url(&self, request: &BookingRequest) -> Result<BookingResponse> {
        HttpBackend::booking_url(self, request).await
    }
}

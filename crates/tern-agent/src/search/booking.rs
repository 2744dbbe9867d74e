//! Booking a flight from an accumulated search

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc};
use tern_wire::BookingRequest;

use super::{backend::SearchBackend, session::SearchSession};
use crate::error::{Error, Result};

/// Opens a booking URL for the user
#[async_trait]
pub trait UrlOpener: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
}

/// Turns pricing tokens into opened booking pages.
///
/// Different flights can book concurrently; a flight that already has a
/// request in flight is refused until that request finishes.
#[derive(Clone)]
pub struct BookingDesk {
    backend: Arc<dyn SearchBackend>,
    opener: Arc<dyn UrlOpener>,
    loading: Arc<Mutex<HashSet<String>>>,
}

/// Clears a flight's loading flag on every exit path
struct LoadingGuard {
    loading: Arc<Mutex<HashSet<String>>>,
    flight_id: String,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.loading.lock().remove(&self.flight_id);
    }
}

impl BookingDesk {
    pub fn new(backend: Arc<dyn SearchBackend>, opener: Arc<dyn UrlOpener>) -> Self {
        Self {
            backend,
            opener,
            loading: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Whether a booking request for this flight is in flight
    pub fn is_loading(&self, flight_id: &str) -> bool {
        self.loading.lock().contains(flight_id)
    }

    fn acquire(&self, flight_id: &str) -> Result<LoadingGuard> {
        if !self.loading.lock().insert(flight_id.to_string()) {
            return Err(Error::BookingInProgress {
                flight_id: flight_id.to_string(),
            });
        }
        Ok(LoadingGuard {
            loading: Arc::clone(&self.loading),
            flight_id: flight_id.to_string(),
        })
    }

    /// Book `flight_id` from `session` and open the resulting URL.
    ///
    /// Fails without touching the network when the flight has no pricing
    /// token. If the backend cannot produce a URL, the flight's own booking
    /// link is used instead. Returns the URL that was opened.
    pub async fn book(&self, session: &SearchSession, flight_id: &str) -> Result<String> {
        let Some(token) = session.pricing_token(flight_id) else {
            return Err(Error::MissingPricingToken {
                flight_id: flight_id.to_string(),
            });
        };
        let _guard = self.acquire(flight_id)?;

        let request = BookingRequest {
            search_id: session.search_id.clone(),
            terms_url: token.to_string(),
        };

        let url = match self.backend.booking_url(&request).await {
            Ok(response) => response.booking_url,
            Err(e) => {
                let fallback = session.flight(flight_id).and_then(|f| f.fallback_url());
                match fallback {
                    Some(url) => {
                        tracing::warn!(
                            flight_id,
                            "booking URL request failed, using the flight's own link: {}",
                            e
                        );
                        url.to_string()
                    }
                    None => return Err(e.into()),
                }
            }
        };

        self.opener.open(&url).await?;
        Ok(url)
    }
}

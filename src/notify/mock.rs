//! Recording notifier for tests

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::Notifier;
use crate::domain::WatchRequest;
use crate::error::{Result, SlotwatchError};

/// One recorded notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Availability { request_id: String },
    BookedOnBehalf { request_id: String },
    Error { request_id: String, message: String },
}

/// Records every notification; can be told to fail deliveries
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
    fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent delivery fail (after recording it)
    pub fn failing(self) -> Self {
        self.fail.store(true, Ordering::SeqCst);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Error { message, .. } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, sent: Sent) -> Result<()> {
        if let Ok(mut all) = self.sent.lock() {
            all.push(sent);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SlotwatchError::Notify("recording notifier set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_availability(&self, request: &WatchRequest) -> Result<()> {
        self.record(Sent::Availability {
            request_id: request.id.clone(),
        })
    }

    async fn send_booked_on_behalf(&self, request: &WatchRequest) -> Result<()> {
        self.record(Sent::BookedOnBehalf {
            request_id: request.id.clone(),
        })
    }

    async fn send_error(&self, request: &WatchRequest, error: &SlotwatchError) -> Result<()> {
        self.record(Sent::Error {
            request_id: request.id.clone(),
            message: error.to_string(),
        })
    }
}

//! Requester and operator notifications.
//!
//! The core treats notification as fire-and-forget: failures are logged by
//! the caller and never retried.

pub mod log_notifier;
pub mod message;
pub mod mock;
pub mod relay;

use async_trait::async_trait;

use crate::domain::WatchRequest;
use crate::error::{Result, SlotwatchError};

pub use log_notifier::LogNotifier;
pub use message::EmailMessage;
pub use mock::{RecordingNotifier, Sent};
pub use relay::{RelayConfig, RelayNotifier};

/// Delivers the three kinds of email the core produces
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Slots are available for the request
    async fn send_availability(&self, request: &WatchRequest) -> Result<()>;

    /// A slot was booked on the requester's behalf
    async fn send_booked_on_behalf(&self, request: &WatchRequest) -> Result<()>;

    /// Operator report for a failed or escalating watch
    async fn send_error(&self, request: &WatchRequest, error: &SlotwatchError) -> Result<()>;
}

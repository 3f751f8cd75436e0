use async_trait::async_trait;

use super::Notifier;
use crate::domain::WatchRequest;
use crate::error::{Result, SlotwatchError};

/// Writes notifications to the log instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_availability(&self, request: &WatchRequest) -> Result<()> {
        log::info!(
            "NOTIFY availability: request={} service={} to={}",
            request.id,
            request.service,
            request.notification_email
        );
        Ok(())
    }

    async fn send_booked_on_behalf(&self, request: &WatchRequest) -> Result<()> {
        log::info!(
            "NOTIFY booked: request={} service={} to={}",
            request.id,
            request.service,
            request.notification_email
        );
        Ok(())
    }

    async fn send_error(&self, request: &WatchRequest, error: &SlotwatchError) -> Result<()> {
        log::error!("NOTIFY error: request={} service={} error={}", request.id, request.service, error);
        Ok(())
    }
}

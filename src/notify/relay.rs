//! Mail-relay notifier
//!
//! Hands composed emails to an HTTP mail relay as JSON, authenticating with
//! the notifier credentials.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::Notifier;
use super::message::{self, EmailMessage};
use crate::domain::WatchRequest;
use crate::error::{Result, SlotwatchError};

/// Relay endpoint and sender identity
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub relay_url: String,
    pub login: String,
    pub password: String,
    pub from_address: String,
    /// Where operator error reports go; None = log only
    pub error_address: Option<String>,
    pub timeout: Duration,
}

pub struct RelayNotifier {
    client: Client,
    config: RelayConfig,
}

impl RelayNotifier {
    pub fn new(config: RelayConfig) -> Result<Self> {
        if config.relay_url.is_empty() {
            return Err(SlotwatchError::Config("notifier.relay_url is empty".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SlotwatchError::Notify(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn deliver(&self, email: &EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.config.relay_url)
            .basic_auth(&self.config.login, Some(&self.config.password))
            .json(email)
            .send()
            .await
            .map_err(|e| SlotwatchError::Notify(format!("Relay request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlotwatchError::Notify(format!("Relay answered {}: {}", status, body)));
        }

        log::info!("Email '{}' handed to relay for {}", email.subject, email.to);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RelayNotifier {
    async fn send_availability(&self, request: &WatchRequest) -> Result<()> {
        self.deliver(&message::availability(request, &self.config.from_address)).await
    }

    async fn send_booked_on_behalf(&self, request: &WatchRequest) -> Result<()> {
        self.deliver(&message::booked_on_behalf(request, &self.config.from_address)).await
    }

    async fn send_error(&self, request: &WatchRequest, error: &SlotwatchError) -> Result<()> {
        match &self.config.error_address {
            Some(to) => {
                let email = message::error_report(request, error, &self.config.from_address, to);
                self.deliver(&email).await
            }
            None => {
                log::error!("No error address configured; request {} failed: {}", request.id, error);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for RelayNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayNotifier")
            .field("relay_url", &self.config.relay_url)
            .field("from_address", &self.config.from_address)
            .finish()
    }
}

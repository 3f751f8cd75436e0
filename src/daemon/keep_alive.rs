//! Keep-alive pinger
//!
//! Periodically GETs a URL so a hosting environment that idles unused
//! processes keeps the daemon running. Failures are logged and ignored.

use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SlotwatchError};

pub struct KeepAlive {
    client: Client,
    url: String,
    interval: Duration,
}

impl KeepAlive {
    pub fn new(url: impl Into<String>, interval: Duration, timeout: Duration) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(SlotwatchError::Config("keep_alive.url is empty".to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, interval })
    }

    /// One GET; returns the response status
    pub async fn ping(&self) -> Result<u16> {
        let response = self.client.get(&self.url).send().await?;
        Ok(response.status().as_u16())
    }

    /// Ping on the configured interval until cancelled
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => match self.ping().await {
                        Ok(status) => log::debug!("Keep-alive {} answered {}", self.url, status),
                        Err(e) => log::warn!("Keep-alive {} failed: {}", self.url, e),
                    },
                }
            }
            log::debug!("Keep-alive stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_url_rejected() {
        let result = KeepAlive::new("", Duration::from_secs(60), Duration::from_secs(5));
        assert!(matches!(result, Err(SlotwatchError::Config(_))));
    }

    #[tokio::test]
    async fn test_ping_unreachable_is_error() {
        let keep_alive = KeepAlive::new("http://127.0.0.1:9/", Duration::from_secs(60), Duration::from_secs(2)).unwrap();
        assert!(keep_alive.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_spawn_stops_on_cancel() {
        let keep_alive = KeepAlive::new("http://127.0.0.1:9/", Duration::from_secs(3600), Duration::from_secs(2)).unwrap();
        let cancel = CancellationToken::new();
        let handle = keep_alive.spawn(cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("keep-alive task did not stop")
            .unwrap();
    }
}

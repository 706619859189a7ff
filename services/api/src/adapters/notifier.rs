//! services/api/src/adapters/notifier.rs
//!
//! Implementations of the `ShareNotifier` port. `WebhookNotifier` hands each
//! share link to an external delivery service over HTTP; `LogNotifier` only
//! records the link and is used when no webhook is configured.

use async_trait::async_trait;
use engagement_core::ports::{PortError, PortResult, ShareNotifier};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

#[derive(Serialize)]
struct SharePayload<'a> {
    recipient: &'a str,
    document_name: &'a str,
    url: &'a str,
}

/// Posts `{recipient, document_name, url}` as JSON to a configured endpoint.
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: impl Into<String>) -> PortResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Self::with_client(http_client, endpoint))
    }

    pub fn with_client(http_client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ShareNotifier for WebhookNotifier {
    async fn notify_share(&self, recipient: &str, document_name: &str, url: &str) -> PortResult<()> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&SharePayload {
                recipient,
                document_name,
                url,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    PortError::Transient(e.to_string())
                } else {
                    PortError::Unexpected(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Unexpected(format!(
                "notification endpoint answered {status}"
            )));
        }
        info!(%recipient, "Share link delivered to notification endpoint");
        Ok(())
    }
}

/// Delivery stand-in that writes the link to the log.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl ShareNotifier for LogNotifier {
    async fn notify_share(&self, recipient: &str, document_name: &str, url: &str) -> PortResult<()> {
        info!(%recipient, %document_name, %url, "Share link ready for delivery");
        Ok(())
    }
}

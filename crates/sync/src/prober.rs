//! Connectivity prober.
//!
//! Answers one question: can the device reach the outside world right
//! now? [`HttpProber`] sends a single request to a fixed endpoint and
//! treats anything other than the expected status, arriving within the
//! deadline, as no connectivity.

use async_trait::async_trait;
use fieldsync_core::config::{ProbeConfig, ProbeMethod};

use crate::error::TransportError;

/// Result of a connectivity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Available,
    Unavailable,
}

/// Port for connectivity checks.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Never fails: every error path reports [`NetworkStatus::Unavailable`].
    async fn check_network_status(&self) -> NetworkStatus;
}

/// Probes connectivity with a lightweight HTTP request.
pub struct HttpProber {
    client: reqwest::Client,
    config: ProbeConfig,
}

impl HttpProber {
    pub fn new(config: ProbeConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: ProbeConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl NetworkProbe for HttpProber {
    async fn check_network_status(&self) -> NetworkStatus {
        let method = match self.config.method {
            ProbeMethod::Get => reqwest::Method::GET,
            ProbeMethod::Head => reqwest::Method::HEAD,
        };
        let request = self.client.request(method, &self.config.url).send();

        match tokio::time::timeout(self.config.timeout(), request).await {
            Ok(Ok(response)) if response.status().as_u16() == self.config.expected_status => {
                NetworkStatus::Available
            }
            Ok(Ok(response)) => {
                tracing::debug!(
                    url = %self.config.url,
                    status = response.status().as_u16(),
                    expected = self.config.expected_status,
                    "Connectivity probe returned unexpected status",
                );
                NetworkStatus::Unavailable
            }
            Ok(Err(e)) => {
                tracing::debug!(url = %self.config.url, error = %e, "Connectivity probe failed");
                NetworkStatus::Unavailable
            }
            Err(_) => {
                tracing::debug!(
                    url = %self.config.url,
                    timeout_ms = self.config.timeout_ms,
                    "Connectivity probe timed out",
                );
                NetworkStatus::Unavailable
            }
        }
    }
}

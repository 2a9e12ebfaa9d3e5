//! Primary channel: HTTP POST to the collector API

use super::channel::Transport;
use super::error::{AttemptError, ChannelKind, DeliveryOutcome};
use crate::config::ApiConfig;
use crate::types::Batch;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

/// Sends each batch as a JSON array to the collector endpoint.
#[derive(Clone)]
pub struct ApiTransport {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl ApiTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            timeout,
        })
    }

    /// Get endpoint for logging
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for ApiTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Primary
    }

    async fn send(&self, _batch: &Batch, body: Vec<u8>) -> DeliveryOutcome {
        let resp = self
            .http
            .post(&self.endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| classify(&e, self.timeout))?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AttemptError::Response {
                status: status.as_u16(),
            })
        }
    }
}

/// Map a reqwest failure onto the attempt error taxonomy.
pub(crate) fn classify(e: &reqwest::Error, timeout: Duration) -> AttemptError {
    if e.is_timeout() {
        AttemptError::Timeout(timeout)
    } else {
        AttemptError::Transport(e.to_string())
    }
}

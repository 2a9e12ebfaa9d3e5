//! Secondary channel: object write to a storage bucket
//!
//! Batches are written with an HTTP `PUT` to an S3-style endpoint. The key
//! is derived from the batch's seal time and id, so every retry of the
//! same batch targets the same object and a late success never leaves a
//! duplicate behind. Request signing, when the store needs it, is done by
//! the gateway named in `storage.endpoint`; this channel only forwards an
//! optional bearer token.

use super::api::classify;
use super::channel::Transport;
use super::error::{AttemptError, ChannelKind, DeliveryOutcome};
use crate::config::StorageConfig;
use crate::types::Batch;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

#[derive(Clone)]
pub struct ObjectStoreTransport {
    http: reqwest::Client,
    /// Everything before the object key, without a trailing slash
    base_url: String,
    key_prefix: String,
    token: Option<String>,
    timeout: Duration,
}

impl ObjectStoreTransport {
    pub fn new(config: &StorageConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: bucket_url(config),
            key_prefix: config.key_prefix.trim_matches('/').to_string(),
            token: config.token.clone(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Object key for a batch: `<prefix>/<YYYY>/<MM>/<DD>/<unix-ts>_<batch-id>.json`.
    pub fn object_key(&self, batch: &Batch) -> String {
        let sealed = batch.sealed_at();
        let name = format!(
            "{}/{}_{}.json",
            sealed.format("%Y/%m/%d"),
            sealed.timestamp(),
            batch.id().simple()
        );
        if self.key_prefix.is_empty() {
            name
        } else {
            format!("{}/{}", self.key_prefix, name)
        }
    }

    pub fn object_url(&self, batch: &Batch) -> String {
        format!("{}/{}", self.base_url, self.object_key(batch))
    }
}

/// Bucket URL: path-style under a configured endpoint, otherwise the
/// virtual-hosted AWS form for the configured region.
fn bucket_url(config: &StorageConfig) -> String {
    match &config.endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket),
        None => format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
    }
}

#[async_trait]
impl Transport for ObjectStoreTransport {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Secondary
    }

    async fn send(&self, batch: &Batch, body: Vec<u8>) -> DeliveryOutcome {
        let mut req = self
            .http
            .put(self.object_url(batch))
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let resp = req.send().await.map_err(|e| classify(&e, self.timeout))?;

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

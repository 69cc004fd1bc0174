//! Telemetry Transport
//!
//! Ships a batch of telemetry records to the analytics endpoint as a JSON
//! array POST. Delivery is best effort: the recorder logs and drops a batch
//! the transport fails to send.
//!
//! Created: 2026-10-04

use super::TelemetryRecord;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait TelemetryTransport: Send + Sync {
    async fn send(&self, batch: &[TelemetryRecord]) -> Result<()>;
}

pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build telemetry HTTP client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl TelemetryTransport for HttpTransport {
    async fn send(&self, batch: &[TelemetryRecord]) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .context("telemetry request failed")?;

        if !response.status().is_success() {
            bail!("telemetry endpoint returned {}", response.status());
        }
        Ok(())
    }
}

//! Telemetry publisher for the remote ingestion endpoint.
//!
//! Publishing is best-effort: one attempt per sample, failures are reported
//! to the caller and the sample is discarded. There is no retry, queue or
//! ordering between concurrent calls.

use std::sync::Arc;

use async_trait::async_trait;

use crate::tracking::config::TrackingConfig;
use crate::tracking::error::PublishError;
use crate::tracking::protocol::{LocationSample, LocationUpdate, VehicleId};

/// Successful publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// HTTP status returned by the sink
    pub status: u16,
}

/// Pushes one position sample to the remote sink
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn push(&self, vehicle_id: &str, sample: &LocationSample) -> Result<Ack, PublishError>;
}

/// Publisher issuing `PUT {endpoint}/bus/location`
///
/// Uses a reusable `reqwest::Client` with connection pooling and the
/// configured request timeout.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    http: reqwest::Client,
    location_url: String,
}

impl HttpPublisher {
    pub fn new(config: &TrackingConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.publish_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self::with_client(http, config.location_url()))
    }

    pub fn with_client(http: reqwest::Client, location_url: String) -> Self {
        Self { http, location_url }
    }

    pub fn location_url(&self) -> &str {
        &self.location_url
    }
}

#[async_trait]
impl TelemetryPublisher for HttpPublisher {
    async fn push(&self, vehicle_id: &str, sample: &LocationSample) -> Result<Ack, PublishError> {
        let body = LocationUpdate::from_sample(vehicle_id, sample);

        let response = self.http.put(&self.location_url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status {
                status: status.as_u16(),
            });
        }

        // Body is only logged
        match response.text().await {
            Ok(text) => tracing::debug!(
                vehicle_id,
                status = status.as_u16(),
                response = %text,
                "Location accepted"
            ),
            Err(e) => tracing::debug!(
                vehicle_id,
                status = status.as_u16(),
                error = %e,
                "Location accepted, response body unreadable"
            ),
        }

        Ok(Ack {
            status: status.as_u16(),
        })
    }
}

/// Publish a sample on a detached task, logging any failure
///
/// The capture loop never waits on the network: a hung publish is abandoned
/// with the runtime, and a failed one is dropped after the warning.
pub fn spawn_publish(
    publisher: Arc<dyn TelemetryPublisher>,
    vehicle_id: VehicleId,
    sample: LocationSample,
    channel: &'static str,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match publisher.push(&vehicle_id, &sample).await {
            Ok(ack) => tracing::trace!(channel, vehicle_id = %vehicle_id, status = ack.status, "Location published"),
            Err(e) => tracing::warn!(
                channel,
                vehicle_id = %vehicle_id,
                error = %e,
                "Failed to publish location, sample dropped"
            ),
        }
    })
}

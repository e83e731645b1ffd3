//! Error types for the tracking core.
//!
//! Only [`SessionError`] reaches the driver. Publish, capture and scheduler
//! errors are logged at the channel boundary and never interrupt a session.

use thiserror::Error;

use super::permission::PermissionTier;
use super::protocol::VehicleId;

/// Errors surfaced to the UI when starting or stopping a session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A session is already starting or active.
    #[error("A tracking session is already in progress for vehicle {vehicle_id}")]
    AlreadyActive { vehicle_id: VehicleId },

    /// The driver denied the location permission required to start.
    #[error("{tier} location permission was denied")]
    PermissionDenied { tier: PermissionTier },

    /// `stop_tracking` was called while the start was still in flight.
    #[error("Tracking start was cancelled")]
    Cancelled,
}

impl SessionError {
    /// Alert title and body for the driver
    pub fn user_message(&self) -> (&'static str, String) {
        match self {
            SessionError::AlreadyActive { vehicle_id } => (
                "Already tracking",
                format!("Stop tracking {} before selecting another bus.", vehicle_id),
            ),
            SessionError::PermissionDenied { .. } => (
                "Permission denied",
                "Location permission is required.".to_string(),
            ),
            SessionError::Cancelled => ("Tracking stopped", "Tracking was cancelled.".to_string()),
        }
    }
}

/// A single publish attempt failed; the sample is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Transport-level failure (DNS, connect, TLS, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    #[error("Server rejected location with status {status}")]
    Status { status: u16 },
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            PublishError::Timeout
        } else if let Some(status) = e.status() {
            PublishError::Status {
                status: status.as_u16(),
            }
        } else {
            PublishError::Network(e.to_string())
        }
    }
}

/// The platform could not produce a position fix.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Location services unavailable: {0}")]
    Unavailable(String),

    #[error("Location permission was revoked")]
    PermissionRevoked,
}

/// Background task registration or invocation failure.
///
/// Logged only; the session manager cannot detect or repair a degraded
/// background channel.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerFault {
    #[error("Background location permission was revoked")]
    PermissionRevoked,

    #[error("Background task '{task}' is no longer registered")]
    RegistrationLost { task: String },

    #[error("Background execution is not supported in this runtime")]
    Unsupported,

    #[error("Scheduler error: {0}")]
    Other(String),
}

/// Arming the background channel failed; nothing is left armed.
#[derive(Debug, Error)]
pub enum ArmError {
    #[error("Failed to persist tracking reference: {0:#}")]
    Store(anyhow::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerFault),
}

// Tracking protocol - value types shared by the capture channels, the
// session manager and the JSON body sent to the ingestion endpoint

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of the vehicle being tracked
pub type VehicleId = String;

const MPS_TO_KMH: f64 = 3.6;

/// Which capture channels a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TrackingMode {
    ForegroundOnly,
    BackgroundOnly,
    Dual,
}

impl TrackingMode {
    pub fn uses_foreground(self) -> bool {
        matches!(self, TrackingMode::ForegroundOnly | TrackingMode::Dual)
    }

    pub fn uses_background(self) -> bool {
        matches!(self, TrackingMode::BackgroundOnly | TrackingMode::Dual)
    }
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingMode::ForegroundOnly => write!(f, "ForegroundOnly"),
            TrackingMode::BackgroundOnly => write!(f, "BackgroundOnly"),
            TrackingMode::Dual => write!(f, "Dual"),
        }
    }
}

impl std::str::FromStr for TrackingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ForegroundOnly" => Ok(TrackingMode::ForegroundOnly),
            "BackgroundOnly" => Ok(TrackingMode::BackgroundOnly),
            "Dual" => Ok(TrackingMode::Dual),
            _ => Err(format!("Unknown tracking mode: {}", s)),
        }
    }
}

/// Lifecycle state of the session manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SessionState {
    /// No vehicle selected
    Idle,
    /// Permission requests in flight
    Starting,
    /// Capture channel(s) running
    Active,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Starting => write!(f, "Starting"),
            SessionState::Active => write!(f, "Active"),
        }
    }
}

/// Vehicle picked by the driver from the route's bus list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleSelection {
    pub vehicle_id: VehicleId,
    pub vehicle_label: String,
    pub route_label: String,
}

impl VehicleSelection {
    pub fn new(
        vehicle_id: impl Into<VehicleId>,
        vehicle_label: impl Into<String>,
        route_label: impl Into<String>,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            vehicle_label: vehicle_label.into(),
            route_label: route_label.into(),
        }
    }
}

/// One instantaneous position reading
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Raw speed as reported by the platform, if any
    pub speed_mps: Option<f64>,
    /// When the reading was taken (not when it is published)
    pub captured_at: DateTime<Utc>,
}

impl LocationSample {
    /// Sample captured now
    pub fn new(latitude: f64, longitude: f64, speed_mps: Option<f64>) -> Self {
        Self::at(latitude, longitude, speed_mps, Utc::now())
    }

    pub fn at(
        latitude: f64,
        longitude: f64,
        speed_mps: Option<f64>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            captured_at,
        }
    }

    /// Speed in m/s with unknown, negative and non-finite values mapped to 0
    pub fn normalized_speed_mps(&self) -> f64 {
        match self.speed_mps {
            Some(speed) if speed.is_finite() && speed > 0.0 => speed,
            _ => 0.0,
        }
    }

    /// Display speed in km/h
    pub fn speed_kmh(&self) -> f64 {
        self.normalized_speed_mps() * MPS_TO_KMH
    }
}

/// Display speed derived from a foreground sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedReading {
    pub speed_kmh: f64,
    pub captured_at: DateTime<Utc>,
}

impl From<&LocationSample> for SpeedReading {
    fn from(sample: &LocationSample) -> Self {
        Self {
            speed_kmh: sample.speed_kmh(),
            captured_at: sample.captured_at,
        }
    }
}

/// One driver's active tracking run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingSession {
    pub vehicle_id: VehicleId,
    pub vehicle_label: String,
    pub route_label: String,
    pub mode: TrackingMode,
    pub started_at: DateTime<Utc>,
    /// Latest foreground-derived speed in km/h
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_known_speed: Option<f64>,
}

impl TrackingSession {
    pub fn new(selection: VehicleSelection, mode: TrackingMode) -> Self {
        Self {
            vehicle_id: selection.vehicle_id,
            vehicle_label: selection.vehicle_label,
            route_label: selection.route_label,
            mode,
            started_at: Utc::now(),
            last_known_speed: None,
        }
    }
}

/// Snapshot handed to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingStatus {
    pub state: SessionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<TrackingSession>,
}

// ============================================================================
// Wire format
// ============================================================================

/// Body of `PUT /bus/location`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub bus_id: String,
    pub lat: f64,
    pub lng: f64,
    pub speed: f64,
    /// ISO-8601 capture time
    pub timestamp: String,
}

impl LocationUpdate {
    pub fn from_sample(vehicle_id: &str, sample: &LocationSample) -> Self {
        Self {
            bus_id: vehicle_id.to_string(),
            lat: sample.latitude,
            lng: sample.longitude,
            speed: sample.normalized_speed_mps(),
            timestamp: sample
                .captured_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

// Live location tracking core
// Session state machine, the two capture channels and the telemetry sink.
// The UI layer drives it through `SessionManager`; platform code supplies the
// position source, permission gate and background scheduler.

pub mod background;
pub mod config;
pub mod error;
pub mod foreground;
pub mod location;
pub mod manager;
pub mod permission;
pub mod protocol;
pub mod publisher;
pub mod scheduler;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use background::{BackgroundChannel, BackgroundWakeHandler, WakeOutcome};
pub use config::{RuntimeContext, TrackingConfig};
pub use error::{ArmError, CaptureError, PublishError, SchedulerFault, SessionError};
pub use foreground::{ForegroundChannel, SubscriptionHandle};
pub use location::PositionSource;
pub use manager::SessionManager;
pub use permission::{
    PermissionDecision, PermissionGate, PermissionTier, SingleTierGate, StaticPermissionGate,
};
pub use protocol::{
    LocationSample, LocationUpdate, SessionState, SpeedReading, TrackingMode, TrackingSession,
    TrackingStatus, VehicleId, VehicleSelection,
};
pub use publisher::{Ack, HttpPublisher, TelemetryPublisher};
pub use scheduler::{BackgroundScheduler, IntervalScheduler, TaskOptions, WakeEvent};
pub use store::{PersistedTrackingRef, SessionStore};

// Driver-side live location tracking core
// Embedded by the driver app shell, which provides the position source,
// permission prompts and OS background scheduler.

// Tracing subscriber setup for embedding hosts
pub mod logging;

// Session state machine, capture channels, publisher and persisted state
pub mod tracking;

// Async polling helpers shared by unit tests
#[cfg(test)]
pub(crate) mod test_utils;

pub use tracking::{
    BackgroundWakeHandler, HttpPublisher, LocationSample, SessionError, SessionManager,
    TrackingConfig, TrackingMode, TrackingSession, VehicleSelection,
};

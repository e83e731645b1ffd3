// Position source abstraction
// Implemented by the platform layer (GPS / fused location provider)

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::tracking::error::CaptureError;
use crate::tracking::protocol::LocationSample;

/// Produces the device's current position
///
/// Implementations set `captured_at` when the fix is taken.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Take a fix on demand; called on every capture tick
    async fn current_position(&self) -> Result<LocationSample, CaptureError>;

    /// Fixes the platform pushes on significant movement
    ///
    /// Called once per foreground subscription. Sources without movement
    /// updates return `None` and are only sampled on the interval.
    fn movement_updates(&self) -> Option<mpsc::Receiver<LocationSample>> {
        None
    }
}

// Foreground capture channel
//
// While the hosting process is alive, samples the position on a fixed
// cadence, or sooner when the platform pushes a fix on significant movement.
// A pushed fix restarts the cadence. For each sample:
// - publishes a display speed (km/h) on a watch channel
// - hands the sample to the publisher on a detached task
//
// `stop` unregisters synchronously: once it returns, no further sample is
// emitted. Publishes already in flight are left to complete.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::tracking::location::PositionSource;
use crate::tracking::protocol::{LocationSample, SpeedReading, VehicleId};
use crate::tracking::publisher::{spawn_publish, TelemetryPublisher};

const CHANNEL_NAME: &str = "foreground";

/// Identifies one foreground subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionHandle {
    id: u64,
}

struct ActiveSubscription {
    id: u64,
    vehicle_id: VehicleId,
    /// Emission gate; cleared under its lock by `stop`
    open: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl ActiveSubscription {
    fn close(self) {
        *self.open.lock().unwrap_or_else(|e| e.into_inner()) = false;
        self.task.abort();
    }
}

/// In-process capture channel; at most one subscription at a time
pub struct ForegroundChannel {
    source: Arc<dyn PositionSource>,
    publisher: Arc<dyn TelemetryPublisher>,
    interval: Duration,
    speed_tx: watch::Sender<Option<SpeedReading>>,
    active: Mutex<Option<ActiveSubscription>>,
    next_id: AtomicU64,
}

impl ForegroundChannel {
    pub fn new(
        source: Arc<dyn PositionSource>,
        publisher: Arc<dyn TelemetryPublisher>,
        interval: Duration,
    ) -> Self {
        let (speed_tx, _) = watch::channel(None);
        Self {
            source,
            publisher,
            interval,
            speed_tx,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start capturing for a vehicle
    ///
    /// Must be called from within a tokio runtime. An existing subscription
    /// is stopped before the new one is armed.
    pub fn start(&self, vehicle_id: &str) -> SubscriptionHandle {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(previous) = active.take() {
            tracing::debug!(
                vehicle_id = %previous.vehicle_id,
                "Replacing active foreground subscription"
            );
            previous.close();
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let open = Arc::new(Mutex::new(true));

        // Stale speed from an earlier session must not be displayed
        self.speed_tx.send_replace(None);

        let task = tokio::spawn(capture_loop(
            Arc::clone(&self.source),
            Arc::clone(&self.publisher),
            self.speed_tx.clone(),
            vehicle_id.to_string(),
            self.interval,
            Arc::clone(&open),
        ));

        tracing::info!(
            vehicle_id,
            interval_ms = self.interval.as_millis() as u64,
            "Foreground capture started"
        );

        *active = Some(ActiveSubscription {
            id,
            vehicle_id: vehicle_id.to_string(),
            open,
            task,
        });

        SubscriptionHandle { id }
    }

    /// Stop a subscription; returns false if the handle is no longer active
    pub fn stop(&self, handle: SubscriptionHandle) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(subscription) if subscription.id == handle.id => {
                if let Some(subscription) = active.take() {
                    tracing::info!(vehicle_id = %subscription.vehicle_id, "Foreground capture stopped");
                    subscription.close();
                }
                true
            }
            _ => false,
        }
    }

    /// Stop whatever subscription is active
    pub fn stop_active(&self) -> bool {
        let subscription = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match subscription {
            Some(subscription) => {
                tracing::info!(vehicle_id = %subscription.vehicle_id, "Foreground capture stopped");
                subscription.close();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Most recent display speed
    pub fn latest_speed(&self) -> Option<SpeedReading> {
        *self.speed_tx.borrow()
    }

    pub fn subscribe_speed(&self) -> watch::Receiver<Option<SpeedReading>> {
        self.speed_tx.subscribe()
    }
}

impl Drop for ForegroundChannel {
    fn drop(&mut self) {
        self.stop_active();
    }
}

async fn capture_loop(
    source: Arc<dyn PositionSource>,
    publisher: Arc<dyn TelemetryPublisher>,
    speed_tx: watch::Sender<Option<SpeedReading>>,
    vehicle_id: VehicleId,
    interval: Duration,
    open: Arc<Mutex<bool>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut movement = source.movement_updates();

    loop {
        let sample = tokio::select! {
            _ = ticker.tick() => match source.current_position().await {
                Ok(sample) => sample,
                Err(e) => {
                    tracing::warn!(vehicle_id = %vehicle_id, error = %e, "Foreground capture failed");
                    continue;
                }
            },
            sample = next_movement(&mut movement) => {
                ticker.reset();
                sample
            }
        };

        if !emit(&open, &publisher, &speed_tx, &vehicle_id, sample) {
            break;
        }
    }
}

/// Next pushed fix; pending forever once the source has none or hangs up
async fn next_movement(updates: &mut Option<mpsc::Receiver<LocationSample>>) -> LocationSample {
    loop {
        let Some(receiver) = updates.as_mut() else {
            return std::future::pending().await;
        };
        if let Some(sample) = receiver.recv().await {
            return sample;
        }
        tracing::debug!("Movement updates closed, continuing on the interval only");
        *updates = None;
    }
}

/// Emit one sample unless the subscription was closed meanwhile
fn emit(
    open: &Mutex<bool>,
    publisher: &Arc<dyn TelemetryPublisher>,
    speed_tx: &watch::Sender<Option<SpeedReading>>,
    vehicle_id: &str,
    sample: LocationSample,
) -> bool {
    let gate = open.lock().unwrap_or_else(|e| e.into_inner());
    if !*gate {
        return false;
    }

    speed_tx.send_replace(Some(SpeedReading::from(&sample)));
    spawn_publish(
        Arc::clone(publisher),
        vehicle_id.to_string(),
        sample,
        CHANNEL_NAME,
    );
    true
}

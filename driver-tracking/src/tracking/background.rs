// Background capture channel
// Arms an OS-managed task and handles its wake-ups. The wake handler owns no
// in-memory session state: the active vehicle is read from the session store
// on every wake, so it works in a process relaunched by the OS.

use std::sync::Arc;

use crate::tracking::config::TrackingConfig;
use crate::tracking::error::{ArmError, SchedulerFault};
use crate::tracking::publisher::{HttpPublisher, TelemetryPublisher};
use crate::tracking::scheduler::{BackgroundScheduler, TaskOptions, WakeEvent};
use crate::tracking::store::{PersistedTrackingRef, SessionStore};

/// Result of handling one wake event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeOutcome {
    /// The OS reported an error instead of samples
    Faulted,
    /// Nothing is armed; samples were discarded
    NoActiveVehicle,
    Published { attempted: usize, delivered: usize },
}

/// Registers and removes the background capture task
pub struct BackgroundChannel {
    scheduler: Arc<dyn BackgroundScheduler>,
    store: SessionStore,
    task_name: String,
    options: TaskOptions,
}

impl BackgroundChannel {
    pub fn new(
        scheduler: Arc<dyn BackgroundScheduler>,
        store: SessionStore,
        task_name: impl Into<String>,
        options: TaskOptions,
    ) -> Self {
        Self {
            scheduler,
            store,
            task_name: task_name.into(),
            options,
        }
    }

    pub fn from_config(config: &TrackingConfig, scheduler: Arc<dyn BackgroundScheduler>) -> Self {
        Self::new(
            scheduler,
            SessionStore::new(config),
            config.background_task_name.clone(),
            TaskOptions::from_config(config),
        )
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Persist the vehicle reference, then register the OS task
    ///
    /// The reference is written first so the very first wake can resolve the
    /// vehicle. If registration fails the reference is cleared again.
    pub async fn arm(&self, vehicle_id: &str) -> Result<(), ArmError> {
        self.store.set(vehicle_id).map_err(ArmError::Store)?;

        if let Err(fault) = self.scheduler.register(&self.task_name, &self.options).await {
            if let Err(e) = self.store.clear() {
                tracing::warn!(error = %e, "Failed to clear tracking reference after registration failure");
            }
            return Err(ArmError::Scheduler(fault));
        }

        tracing::info!(vehicle_id, task_name = %self.task_name, "Background channel armed");
        Ok(())
    }

    /// Unregister the OS task if present and clear the persisted reference
    ///
    /// Safe to call when nothing is armed. Failures are logged.
    pub async fn disarm(&self) {
        if self.scheduler.is_registered(&self.task_name).await {
            match self.scheduler.unregister(&self.task_name).await {
                Ok(()) => tracing::info!(task_name = %self.task_name, "Background channel disarmed"),
                Err(e) => tracing::warn!(
                    task_name = %self.task_name,
                    error = %e,
                    "Failed to unregister background task"
                ),
            }
        }

        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear tracking reference");
        }
    }

    pub async fn is_armed(&self) -> bool {
        self.scheduler.is_registered(&self.task_name).await
    }

    /// Reference left by this or a previous process, if any
    pub fn persisted_ref(&self) -> Option<PersistedTrackingRef> {
        self.store.load()
    }
}

/// Stateless handler for OS-delivered position batches
pub struct BackgroundWakeHandler {
    store: SessionStore,
    publisher: Arc<dyn TelemetryPublisher>,
}

impl BackgroundWakeHandler {
    pub fn new(store: SessionStore, publisher: Arc<dyn TelemetryPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Build a handler from scratch, as a relaunched process would
    pub fn from_config(config: &TrackingConfig) -> anyhow::Result<Self> {
        let publisher = HttpPublisher::new(config)?;
        Ok(Self::new(SessionStore::new(config), Arc::new(publisher)))
    }

    /// Publish every sample in the batch for the persisted vehicle
    ///
    /// Samples are pushed one at a time in delivery order. A failed push is
    /// logged and does not affect the rest of the batch.
    pub async fn handle_wake(&self, event: WakeEvent) -> WakeOutcome {
        let samples = match event.outcome {
            Ok(samples) => samples,
            Err(fault) => {
                log_fault(&event.task_name, &fault);
                return WakeOutcome::Faulted;
            }
        };

        let Some(vehicle_id) = self.store.get() else {
            tracing::debug!(
                task_name = %event.task_name,
                discarded = samples.len(),
                "Background wake with no active vehicle"
            );
            return WakeOutcome::NoActiveVehicle;
        };

        let attempted = samples.len();
        let mut delivered = 0;
        for sample in &samples {
            match self.publisher.push(&vehicle_id, sample).await {
                Ok(_) => delivered += 1,
                Err(e) => tracing::warn!(
                    channel = "background",
                    vehicle_id = %vehicle_id,
                    error = %e,
                    "Failed to publish location, sample dropped"
                ),
            }
        }

        tracing::debug!(vehicle_id = %vehicle_id, attempted, delivered, "Background batch handled");
        WakeOutcome::Published { attempted, delivered }
    }
}

fn log_fault(task_name: &str, fault: &SchedulerFault) {
    tracing::error!(task_name, error = %fault, "Background location task failed");
}

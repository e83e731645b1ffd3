// In-memory collaborators for unit tests

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::tracking::error::{CaptureError, PublishError, SchedulerFault};
use crate::tracking::location::PositionSource;
use crate::tracking::protocol::{LocationSample, LocationUpdate};
use crate::tracking::publisher::{Ack, TelemetryPublisher};
use crate::tracking::scheduler::{BackgroundScheduler, TaskOptions};

/// Publisher that records every delivered body
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    delivered: Mutex<Vec<LocationUpdate>>,
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` pushes with a server error
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<LocationUpdate> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelemetryPublisher for RecordingPublisher {
    async fn push(&self, vehicle_id: &str, sample: &LocationSample) -> Result<Ack, PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(PublishError::Status { status: 503 });
        }

        self.delivered
            .lock()
            .unwrap()
            .push(LocationUpdate::from_sample(vehicle_id, sample));
        Ok(Ack { status: 200 })
    }
}

/// Source returning a fixed position, optionally failing first
///
/// Movement fixes can be pushed to the latest subscriber.
#[derive(Debug)]
pub struct ScriptedPositionSource {
    sample: LocationSample,
    errors: Mutex<VecDeque<CaptureError>>,
    calls: AtomicUsize,
    movement: Mutex<Option<mpsc::Sender<LocationSample>>>,
}

impl ScriptedPositionSource {
    pub fn new(latitude: f64, longitude: f64, speed_mps: Option<f64>) -> Self {
        Self {
            sample: LocationSample::new(latitude, longitude, speed_mps),
            errors: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            movement: Mutex::new(None),
        }
    }

    /// Push a fix as if the platform detected movement
    pub async fn push_movement(&self, sample: LocationSample) -> bool {
        let sender = self.movement.lock().unwrap().clone();
        match sender {
            Some(sender) => sender.send(sample).await.is_ok(),
            None => false,
        }
    }

    pub fn push_error(&self, error: CaptureError) {
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for ScriptedPositionSource {
    async fn current_position(&self) -> Result<LocationSample, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut sample = self.sample.clone();
        sample.captured_at = chrono::Utc::now();
        Ok(sample)
    }

    fn movement_updates(&self) -> Option<mpsc::Receiver<LocationSample>> {
        let (tx, rx) = mpsc::channel(16);
        *self.movement.lock().unwrap() = Some(tx);
        Some(rx)
    }
}

/// Scheduler that only tracks registrations
#[derive(Debug, Default)]
pub struct FakeScheduler {
    registered: Mutex<HashSet<String>>,
    register_fault: Mutex<Option<SchedulerFault>>,
    unregister_calls: AtomicUsize,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `register` fail
    pub fn fail_register(&self, fault: SchedulerFault) {
        *self.register_fault.lock().unwrap() = Some(fault);
    }

    pub fn is_task_registered(&self, task_name: &str) -> bool {
        self.registered.lock().unwrap().contains(task_name)
    }

    pub fn unregister_calls(&self) -> usize {
        self.unregister_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackgroundScheduler for FakeScheduler {
    async fn register(&self, task_name: &str, _options: &TaskOptions) -> Result<(), SchedulerFault> {
        if let Some(fault) = self.register_fault.lock().unwrap().clone() {
            return Err(fault);
        }
        self.registered.lock().unwrap().insert(task_name.to_string());
        Ok(())
    }

    async fn unregister(&self, task_name: &str) -> Result<(), SchedulerFault> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().unwrap().remove(task_name);
        Ok(())
    }

    async fn is_registered(&self, task_name: &str) -> bool {
        self.is_task_registered(task_name)
    }
}

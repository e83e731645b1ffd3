// Platform stand-ins for the position source and OS scheduler

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use driver_tracking_lib::tracking::{
    BackgroundScheduler, CaptureError, LocationSample, PositionSource, SchedulerFault, TaskOptions,
};

/// Always reports the same fix with a fresh timestamp
pub struct FixedPositionSource {
    latitude: f64,
    longitude: f64,
    speed_mps: Option<f64>,
    calls: AtomicUsize,
}

impl FixedPositionSource {
    pub fn new(latitude: f64, longitude: f64, speed_mps: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn current_position(&self) -> Result<LocationSample, CaptureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LocationSample::new(
            self.latitude,
            self.longitude,
            self.speed_mps,
        ))
    }
}

/// Registry standing in for the OS task scheduler; never fires by itself
#[derive(Default)]
pub struct RecordingScheduler {
    registered: Mutex<HashSet<String>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_task_registered(&self, task_name: &str) -> bool {
        self.registered
            .lock()
            .expect("registered lock")
            .contains(task_name)
    }
}

#[async_trait]
impl BackgroundScheduler for RecordingScheduler {
    async fn register(&self, task_name: &str, _options: &TaskOptions) -> Result<(), SchedulerFault> {
        self.registered
            .lock()
            .expect("registered lock")
            .insert(task_name.to_string());
        Ok(())
    }

    async fn unregister(&self, task_name: &str) -> Result<(), SchedulerFault> {
        self.registered
            .lock()
            .expect("registered lock")
            .remove(task_name);
        Ok(())
    }

    async fn is_registered(&self, task_name: &str) -> bool {
        self.is_task_registered(task_name)
    }
}

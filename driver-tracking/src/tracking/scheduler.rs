//! OS scheduler abstraction for background capture.
//!
//! The platform registers a named task that keeps delivering position
//! batches after the hosting process is suspended or killed. Each delivery
//! arrives as a [`WakeEvent`] at a [`BackgroundWakeHandler`], which may be
//! constructed in a freshly relaunched process.
//!
//! [`IntervalScheduler`] is the in-process implementation used on desktop:
//! it drives the wake handler from a tokio task and therefore only lives as
//! long as the process that registered it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::tracking::background::BackgroundWakeHandler;
use crate::tracking::config::TrackingConfig;
use crate::tracking::error::SchedulerFault;
use crate::tracking::location::PositionSource;
use crate::tracking::protocol::LocationSample;

/// Parameters passed to the OS when registering the capture task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    /// Minimum time between deliveries
    pub interval: Duration,
    /// Persistent notification shown while the task runs (Android)
    pub notification_title: String,
    pub notification_body: String,
}

impl TaskOptions {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            interval: config.capture_interval,
            notification_title: "Bus tracking active".to_string(),
            notification_body: "Your location is being shared with passengers.".to_string(),
        }
    }
}

/// One invocation of the background task by the OS
#[derive(Debug, Clone)]
pub struct WakeEvent {
    pub task_name: String,
    /// Delivered samples, or the fault the OS reported instead
    pub outcome: Result<Vec<LocationSample>, SchedulerFault>,
}

impl WakeEvent {
    pub fn delivered(task_name: impl Into<String>, samples: Vec<LocationSample>) -> Self {
        Self {
            task_name: task_name.into(),
            outcome: Ok(samples),
        }
    }

    pub fn faulted(task_name: impl Into<String>, fault: SchedulerFault) -> Self {
        Self {
            task_name: task_name.into(),
            outcome: Err(fault),
        }
    }
}

/// OS-managed recurring task registry
#[async_trait]
pub trait BackgroundScheduler: Send + Sync {
    /// Register (or re-register) a named capture task
    async fn register(&self, task_name: &str, options: &TaskOptions) -> Result<(), SchedulerFault>;

    /// Remove a named task; unknown names are not an error
    async fn unregister(&self, task_name: &str) -> Result<(), SchedulerFault>;

    async fn is_registered(&self, task_name: &str) -> bool;
}

/// Tokio-backed scheduler that wakes the handler on a fixed cadence
pub struct IntervalScheduler {
    source: Arc<dyn PositionSource>,
    handler: Arc<BackgroundWakeHandler>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl IntervalScheduler {
    pub fn new(source: Arc<dyn PositionSource>, handler: Arc<BackgroundWakeHandler>) -> Self {
        Self {
            source,
            handler,
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl BackgroundScheduler for IntervalScheduler {
    async fn register(&self, task_name: &str, options: &TaskOptions) -> Result<(), SchedulerFault> {
        if options.interval.is_zero() {
            return Err(SchedulerFault::Other(
                "task interval must be non-zero".to_string(),
            ));
        }

        let task = tokio::spawn(wake_loop(
            task_name.to_string(),
            options.interval,
            Arc::clone(&self.source),
            Arc::clone(&self.handler),
        ));

        let previous = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_name.to_string(), task);
        if let Some(previous) = previous {
            previous.abort();
        }

        tracing::debug!(task_name, interval_ms = options.interval.as_millis() as u64, "Background task registered");
        Ok(())
    }

    async fn unregister(&self, task_name: &str) -> Result<(), SchedulerFault> {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(task_name);
        if let Some(task) = task {
            task.abort();
            tracing::debug!(task_name, "Background task unregistered");
        }
        Ok(())
    }

    async fn is_registered(&self, task_name: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(task_name)
            .is_some_and(|task| !task.is_finished())
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

async fn wake_loop(
    task_name: String,
    interval: Duration,
    source: Arc<dyn PositionSource>,
    handler: Arc<BackgroundWakeHandler>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let event = match source.current_position().await {
            Ok(sample) => WakeEvent::delivered(task_name.as_str(), vec![sample]),
            Err(e) => WakeEvent::faulted(task_name.as_str(), SchedulerFault::Other(e.to_string())),
        };

        handler.handle_wake(event).await;
    }
}

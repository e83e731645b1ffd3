// Session manager
// Owns the Idle -> Starting -> Active -> Idle state machine and arms the
// capture channels implied by the resolved mode. Its methods are the only
// way to start or end a tracking session.
//
// The state mutex is never held across an await: permission prompts run
// unlocked, and the attempt counter detects a stop that arrived in the
// meantime. Background arming, the commit that follows it and the disarm in
// `stop_tracking` are serialized by the arming lock, so the persisted
// reference only ever names the attempt that owns the state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Mutex as AsyncMutex};

use crate::tracking::background::BackgroundChannel;
use crate::tracking::config::{RuntimeContext, TrackingConfig};
use crate::tracking::error::SessionError;
use crate::tracking::foreground::{ForegroundChannel, SubscriptionHandle};
use crate::tracking::location::PositionSource;
use crate::tracking::permission::{PermissionGate, PermissionTier};
use crate::tracking::protocol::{
    SessionState, SpeedReading, TrackingMode, TrackingSession, TrackingStatus, VehicleSelection,
};
use crate::tracking::publisher::{HttpPublisher, TelemetryPublisher};
use crate::tracking::scheduler::BackgroundScheduler;
use crate::tracking::store::PersistedTrackingRef;

enum ManagerState {
    Idle,
    Starting {
        attempt: u64,
        selection: VehicleSelection,
    },
    Active {
        session: TrackingSession,
        subscription: SubscriptionHandle,
    },
}

impl ManagerState {
    fn public(&self) -> SessionState {
        match self {
            ManagerState::Idle => SessionState::Idle,
            ManagerState::Starting { .. } => SessionState::Starting,
            ManagerState::Active { .. } => SessionState::Active,
        }
    }
}

/// What `select_vehicle` found when it came back to commit
enum Commit {
    Started(TrackingSession),
    /// Stopped while starting, nothing newer has begun
    Cancelled,
    /// Stopped while starting and a newer attempt has begun since
    Superseded,
}

/// Driver-facing entry point for live location sharing
pub struct SessionManager {
    runtime: RuntimeContext,
    gate: Arc<dyn PermissionGate>,
    foreground: ForegroundChannel,
    background: BackgroundChannel,
    state: Mutex<ManagerState>,
    next_attempt: AtomicU64,
    /// Held from the ownership check through arm and commit
    arming: AsyncMutex<()>,
}

impl SessionManager {
    pub fn new(
        runtime: RuntimeContext,
        gate: Arc<dyn PermissionGate>,
        foreground: ForegroundChannel,
        background: BackgroundChannel,
    ) -> Self {
        Self {
            runtime,
            gate,
            foreground,
            background,
            state: Mutex::new(ManagerState::Idle),
            next_attempt: AtomicU64::new(1),
            arming: AsyncMutex::new(()),
        }
    }

    /// Wire up the HTTP publisher and both channels from configuration
    pub fn from_config(
        config: &TrackingConfig,
        gate: Arc<dyn PermissionGate>,
        source: Arc<dyn PositionSource>,
        scheduler: Arc<dyn BackgroundScheduler>,
    ) -> anyhow::Result<Self> {
        config.ensure_dirs()?;

        let publisher: Arc<dyn TelemetryPublisher> = Arc::new(HttpPublisher::new(config)?);
        let foreground = ForegroundChannel::new(source, publisher, config.capture_interval);
        let background = BackgroundChannel::from_config(config, scheduler);

        Ok(Self::new(config.runtime, gate, foreground, background))
    }

    /// Start tracking the selected vehicle
    ///
    /// Only valid from `Idle`. Permission prompts happen here; a denial of
    /// foreground permission returns the manager to `Idle` without arming
    /// anything.
    pub async fn select_vehicle(
        &self,
        selection: VehicleSelection,
    ) -> Result<TrackingSession, SessionError> {
        let attempt = self.begin(&selection)?;
        tracing::info!(
            vehicle_id = %selection.vehicle_id,
            route = %selection.route_label,
            "Starting tracking session"
        );

        let mut mode = match self.resolve_mode().await {
            Ok(mode) => mode,
            Err(e) => {
                self.abandon(attempt);
                tracing::warn!(vehicle_id = %selection.vehicle_id, error = %e, "Tracking start refused");
                return Err(e);
            }
        };

        let _arming = self.arming.lock().await;

        // An attempt that lost the state must not touch the store
        let mut armed = false;
        if mode.uses_background() && self.owns(attempt) {
            match self.background.arm(&selection.vehicle_id).await {
                Ok(()) => armed = true,
                Err(e) => {
                    tracing::warn!(
                        vehicle_id = %selection.vehicle_id,
                        error = %e,
                        "Background registration failed, continuing in foreground only"
                    );
                    mode = TrackingMode::ForegroundOnly;
                }
            }
        }

        let commit = self.commit(attempt, selection, mode);
        if armed && !matches!(commit, Commit::Started(_)) {
            // A newer attempt cannot have armed while the lock is held, so
            // clearing restores the reference it expects
            self.background.disarm().await;
        }

        match commit {
            Commit::Started(session) => {
                tracing::info!(vehicle_id = %session.vehicle_id, mode = %session.mode, "Tracking session active");
                Ok(session)
            }
            Commit::Cancelled => {
                tracing::info!("Tracking start cancelled");
                Err(SessionError::Cancelled)
            }
            Commit::Superseded => {
                tracing::info!("Tracking start superseded by a newer selection");
                Err(SessionError::Cancelled)
            }
        }
    }

    /// End the current session, releasing both channels
    ///
    /// Both channels are released regardless of mode, and the persisted
    /// reference is always cleared, including one left by an earlier launch.
    /// Calling this while `Idle` is otherwise a no-op.
    pub async fn stop_tracking(&self) -> Option<TrackingSession> {
        let previous = {
            let mut state = self.lock_state();
            std::mem::replace(&mut *state, ManagerState::Idle)
        };

        let ended = match previous {
            ManagerState::Active {
                session,
                subscription,
            } => {
                let session = self.with_latest_speed(session);
                self.foreground.stop(subscription);
                Some(session)
            }
            ManagerState::Starting { selection, .. } => {
                tracing::info!(vehicle_id = %selection.vehicle_id, "Stop requested while starting");
                None
            }
            ManagerState::Idle => {
                if let Some(leftover) = self.background.persisted_ref() {
                    tracing::info!(
                        vehicle_id = %leftover.vehicle_id,
                        "Clearing background tracking left by a previous launch"
                    );
                }
                None
            }
        };

        {
            let _arming = self.arming.lock().await;
            self.background.disarm().await;
        }

        if let Some(session) = &ended {
            tracing::info!(vehicle_id = %session.vehicle_id, "Tracking session ended");
        }
        ended
    }

    /// Process teardown: stop foreground capture, leave background armed
    pub fn shutdown(&self) {
        if self.foreground.stop_active() {
            tracing::info!("Foreground capture torn down on shutdown");
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().public()
    }

    /// Active session with its latest display speed
    pub fn session(&self) -> Option<TrackingSession> {
        let session = match &*self.lock_state() {
            ManagerState::Active { session, .. } => session.clone(),
            _ => return None,
        };
        Some(self.with_latest_speed(session))
    }

    pub fn status(&self) -> TrackingStatus {
        let (state, session) = {
            let state = self.lock_state();
            let session = match &*state {
                ManagerState::Active { session, .. } => Some(session.clone()),
                _ => None,
            };
            (state.public(), session)
        };

        TrackingStatus {
            state,
            session: session.map(|s| self.with_latest_speed(s)),
        }
    }

    pub fn subscribe_speed(&self) -> watch::Receiver<Option<SpeedReading>> {
        self.foreground.subscribe_speed()
    }

    /// Background reference on disk, possibly left by a previous launch
    pub fn pending_background_ref(&self) -> Option<PersistedTrackingRef> {
        self.background.persisted_ref()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn begin(&self, selection: &VehicleSelection) -> Result<u64, SessionError> {
        let mut state = self.lock_state();
        match &*state {
            ManagerState::Idle => {}
            ManagerState::Starting { selection, .. } => {
                return Err(SessionError::AlreadyActive {
                    vehicle_id: selection.vehicle_id.clone(),
                })
            }
            ManagerState::Active { session, .. } => {
                return Err(SessionError::AlreadyActive {
                    vehicle_id: session.vehicle_id.clone(),
                })
            }
        }

        let attempt = self.next_attempt.fetch_add(1, Ordering::SeqCst);
        *state = ManagerState::Starting {
            attempt,
            selection: selection.clone(),
        };
        Ok(attempt)
    }

    fn owns(&self, attempt: u64) -> bool {
        matches!(&*self.lock_state(), ManagerState::Starting { attempt: current, .. } if *current == attempt)
    }

    /// Return to Idle if this attempt still owns the state
    fn abandon(&self, attempt: u64) {
        let mut state = self.lock_state();
        if matches!(&*state, ManagerState::Starting { attempt: current, .. } if *current == attempt)
        {
            *state = ManagerState::Idle;
        }
    }

    fn commit(&self, attempt: u64, selection: VehicleSelection, mode: TrackingMode) -> Commit {
        let mut state = self.lock_state();
        match &*state {
            ManagerState::Starting {
                attempt: current, ..
            } if *current == attempt => {}
            ManagerState::Idle => return Commit::Cancelled,
            _ => return Commit::Superseded,
        }

        let session = TrackingSession::new(selection, mode);
        let subscription = self.foreground.start(&session.vehicle_id);
        *state = ManagerState::Active {
            session: session.clone(),
            subscription,
        };
        Commit::Started(session)
    }

    async fn resolve_mode(&self) -> Result<TrackingMode, SessionError> {
        if !self.gate.request_foreground().await.is_granted() {
            return Err(SessionError::PermissionDenied {
                tier: PermissionTier::Foreground,
            });
        }

        if !self.runtime.supports_background_execution() {
            tracing::info!(runtime = ?self.runtime, "Background execution unavailable");
            return Ok(TrackingMode::ForegroundOnly);
        }

        if self.gate.request_background().await.is_granted() {
            Ok(TrackingMode::Dual)
        } else {
            tracing::info!("Background permission denied, tracking in foreground only");
            Ok(TrackingMode::ForegroundOnly)
        }
    }

    fn with_latest_speed(&self, mut session: TrackingSession) -> TrackingSession {
        if let Some(reading) = self.foreground.latest_speed() {
            session.last_known_speed = Some(reading.speed_kmh);
        }
        session
    }
}

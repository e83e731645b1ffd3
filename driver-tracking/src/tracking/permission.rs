// Permission gate for location access
// Foreground and background access are separate tiers on platforms that
// distinguish them; the gate is queried fresh before each channel is armed

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Outcome of a permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PermissionDecision {
    Granted,
    Denied,
}

impl PermissionDecision {
    pub fn is_granted(self) -> bool {
        matches!(self, PermissionDecision::Granted)
    }
}

/// Permission tier being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PermissionTier {
    Foreground,
    Background,
}

impl std::fmt::Display for PermissionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PermissionTier::Foreground => write!(f, "Foreground"),
            PermissionTier::Background => write!(f, "Background"),
        }
    }
}

/// Runtime capability to read the device position
///
/// The OS shows a consent prompt at most once per install per tier and
/// answers later requests from its cached decision. Callers must not cache
/// the result themselves: the driver can revoke access in system settings
/// at any time.
#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Request access while the app is in the foreground
    async fn request_foreground(&self) -> PermissionDecision;

    /// Request access while the app is suspended or not running
    async fn request_background(&self) -> PermissionDecision;
}

/// Adapter for platforms without a separate background tier
///
/// Background access is granted exactly when foreground access is.
pub struct SingleTierGate<G> {
    inner: G,
}

impl<G: PermissionGate> SingleTierGate<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<G: PermissionGate> PermissionGate for SingleTierGate<G> {
    async fn request_foreground(&self) -> PermissionDecision {
        self.inner.request_foreground().await
    }

    async fn request_background(&self) -> PermissionDecision {
        self.inner.request_foreground().await
    }
}

/// Gate with fixed decisions, for desktop runs and tests
///
/// Mirrors the OS prompt-once behaviour: the first request per tier counts
/// as a prompt, later requests return the current decision silently.
/// Decisions can be changed afterwards to model the driver revoking access.
#[derive(Debug)]
pub struct StaticPermissionGate {
    decisions: Mutex<(PermissionDecision, PermissionDecision)>,
    prompted: Mutex<Vec<PermissionTier>>,
    requests: AtomicUsize,
}

impl StaticPermissionGate {
    pub fn new(foreground: PermissionDecision, background: PermissionDecision) -> Self {
        Self {
            decisions: Mutex::new((foreground, background)),
            prompted: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionDecision::Granted, PermissionDecision::Granted)
    }

    pub fn denied() -> Self {
        Self::new(PermissionDecision::Denied, PermissionDecision::Denied)
    }

    /// Change the stored decision for a tier
    pub fn set_decision(&self, tier: PermissionTier, decision: PermissionDecision) {
        let mut decisions = self.decisions.lock().unwrap_or_else(|e| e.into_inner());
        match tier {
            PermissionTier::Foreground => decisions.0 = decision,
            PermissionTier::Background => decisions.1 = decision,
        }
    }

    /// Whether a consent prompt was shown for the tier
    pub fn was_prompted(&self, tier: PermissionTier) -> bool {
        self.prompted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&tier)
    }

    /// Total number of requests across both tiers
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn decide(&self, tier: PermissionTier) -> PermissionDecision {
        self.requests.fetch_add(1, Ordering::SeqCst);

        {
            let mut prompted = self.prompted.lock().unwrap_or_else(|e| e.into_inner());
            if !prompted.contains(&tier) {
                tracing::debug!(%tier, "Showing location consent prompt");
                prompted.push(tier);
            }
        }

        let decisions = self.decisions.lock().unwrap_or_else(|e| e.into_inner());
        match tier {
            PermissionTier::Foreground => decisions.0,
            PermissionTier::Background => decisions.1,
        }
    }
}

#[async_trait]
impl PermissionGate for StaticPermissionGate {
    async fn request_foreground(&self) -> PermissionDecision {
        self.decide(PermissionTier::Foreground)
    }

    async fn request_background(&self) -> PermissionDecision {
        self.decide(PermissionTier::Background)
    }
}

// Environment configuration for the tracking core
// Resolves the state directory, ingestion endpoint and capture cadence

use std::path::PathBuf;
use std::time::Duration;

/// Ingestion server used when no override is configured
pub const DEFAULT_ENDPOINT: &str = "https://public-transport-tracking-server.onrender.com";

/// Nominal foreground capture cadence
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_secs(5);

/// Request timeout for a single location publish
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// Name under which the background capture task is registered with the OS
pub const BACKGROUND_TASK_NAME: &str = "background-location-task";

const ENV_STATE_DIR: &str = "DRIVER_TRACKING_DIR";
const ENV_ENDPOINT: &str = "DRIVER_TRACKING_ENDPOINT";
const ENV_INTERVAL_MS: &str = "DRIVER_TRACKING_INTERVAL_MS";
const ENV_TIMEOUT_SECS: &str = "DRIVER_TRACKING_TIMEOUT_SECS";
const ENV_SANDBOXED: &str = "DRIVER_TRACKING_SANDBOXED";

/// Execution environment the app is hosted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeContext {
    /// Installed build; the OS may run background tasks for it
    Standalone,
    /// Sandboxed preview host that cannot grant true background execution
    SandboxedPreview,
}

impl RuntimeContext {
    pub fn supports_background_execution(self) -> bool {
        matches!(self, RuntimeContext::Standalone)
    }
}

/// Configuration for the tracking core
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Directory holding the persisted tracking reference
    pub state_dir: PathBuf,
    /// Base URL of the ingestion server (no trailing slash)
    pub endpoint: String,
    /// Foreground capture cadence
    pub capture_interval: Duration,
    /// Timeout applied to each publish request
    pub publish_timeout: Duration,
    /// Whether background execution is available at all
    pub runtime: RuntimeContext,
    /// Name of the OS-managed background capture task
    pub background_task_name: String,
}

impl TrackingConfig {
    /// Create configuration using default paths
    pub fn default_paths() -> Self {
        Self {
            state_dir: Self::default_state_dir(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            capture_interval: DEFAULT_CAPTURE_INTERVAL,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            runtime: RuntimeContext::Standalone,
            background_task_name: BACKGROUND_TASK_NAME.to_string(),
        }
    }

    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default_paths();

        if let Some(dir) = lookup(ENV_STATE_DIR).filter(|d| !d.trim().is_empty()) {
            config.state_dir = PathBuf::from(dir);
        }

        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|e| !e.trim().is_empty()) {
            config.endpoint = endpoint.trim().trim_end_matches('/').to_string();
        }

        if let Some(raw) = lookup(ENV_INTERVAL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.capture_interval = Duration::from_millis(ms),
                _ => tracing::warn!(value = %raw, "Ignoring invalid {}", ENV_INTERVAL_MS),
            }
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.publish_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }

        if let Some(raw) = lookup(ENV_SANDBOXED) {
            if matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes") {
                config.runtime = RuntimeContext::SandboxedPreview;
            }
        }

        config
    }

    /// Get the default state directory
    fn default_state_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".driver-tracking"))
            .unwrap_or_else(|| PathBuf::from("/tmp/driver-tracking"))
    }

    /// Path of the persisted tracking reference
    pub fn tracking_file(&self) -> PathBuf {
        self.state_dir.join("tracking.json")
    }

    /// Full URL of the location ingestion route
    pub fn location_url(&self) -> String {
        format!("{}/bus/location", self.endpoint)
    }

    /// Ensure the state directory exists, private to the user on Unix
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.state_dir, std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(())
    }
}

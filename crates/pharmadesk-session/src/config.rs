//! Monitor and rate-limit configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::ports::ActivityKind;

/// Default storage key for the last-activity timestamp
pub const DEFAULT_STORAGE_KEY: &str = "pharmadesk.last_activity";

/// Default login entry point
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Session monitor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Idle time after which the session is invalidated (seconds)
    pub timeout_secs: u64,

    /// Length of the warning window before the timeout (seconds)
    pub warning_window_secs: u64,

    /// Evaluator polling interval (seconds)
    pub poll_interval_secs: u64,

    /// How long the warning notice stays on screen (seconds)
    pub warning_notice_secs: u64,

    /// Minimum spacing between remote audit writes for activity (seconds)
    pub activity_audit_interval_secs: u64,

    /// Interaction kinds that count as activity
    pub tracked_events: Vec<ActivityKind>,

    /// Durable storage key for the last-activity record
    pub storage_key: String,

    /// Where to send the user on logout or expiry
    pub login_path: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30 * 60,      // 30 minutes
            warning_window_secs: 5 * 60, // 5 minute warning
            poll_interval_secs: 60,
            warning_notice_secs: 10,
            activity_audit_interval_secs: 60,
            tracked_events: ActivityKind::ALL.to_vec(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Shorter timeouts for workstations on shared wards
    pub fn strict() -> Self {
        Self {
            timeout_secs: 10 * 60,
            warning_window_secs: 2 * 60,
            poll_interval_secs: 15,
            ..Self::default()
        }
    }

    /// Lenient timeouts for local development
    pub fn development() -> Self {
        Self {
            timeout_secs: 4 * 60 * 60,
            warning_window_secs: 15 * 60,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn warning_window(&self) -> Duration {
        Duration::from_secs(self.warning_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn warning_notice_duration(&self) -> Duration {
        Duration::from_secs(self.warning_notice_secs)
    }

    pub fn activity_audit_interval(&self) -> Duration {
        Duration::from_secs(self.activity_audit_interval_secs)
    }

    /// Whether an interaction kind counts as activity
    pub fn tracks(&self, kind: ActivityKind) -> bool {
        self.tracked_events.contains(&kind)
    }

    /// Reject configurations the evaluator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(SessionError::Config("timeout_secs must be > 0".into()));
        }
        if self.poll_interval_secs == 0 {
            return Err(SessionError::Config(
                "poll_interval_secs must be > 0".into(),
            ));
        }
        if self.warning_window_secs >= self.timeout_secs {
            return Err(SessionError::Config(format!(
                "warning_window_secs ({}) must be shorter than timeout_secs ({})",
                self.warning_window_secs, self.timeout_secs
            )));
        }
        if self.storage_key.is_empty() {
            return Err(SessionError::Config("storage_key must not be empty".into()));
        }
        Ok(())
    }
}

/// Fixed-window rate limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed operations per window
    pub limit: u32,
    /// Window length (milliseconds)
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Login throttling: 5 attempts per 15 minutes
    pub fn login() -> Self {
        Self::new(5, Duration::from_secs(15 * 60))
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(SessionError::Config("rate limit must be > 0".into()));
        }
        if self.window_ms == 0 {
            return Err(SessionError::Config("rate window must be > 0".into()));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::login()
    }
}

/// Load a JSON configuration file
pub fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Save a value as pretty JSON, creating parent directories
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content)?;
    Ok(())
}

//! Idle-timeout evaluation
//!
//! The decision is a pure function of elapsed idle time so the thresholds can
//! be tested without timers. [`TimeoutEvaluator`] adds the per-window
//! de-duplication of the warning notice.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::config::MonitorConfig;

const MINUTE_MS: u128 = 60_000;

/// Outcome of one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Recent activity, nothing to do
    Fresh,
    /// Within the warning window
    Warning {
        /// Whole minutes until expiry, rounded up
        minutes_remaining: u64,
    },
    /// Idle for longer than the timeout
    Expired,
}

/// Classify an idle duration against the configured thresholds
///
/// Warning covers `(timeout - warning_window, timeout]`, Expired covers
/// everything above `timeout`.
pub fn evaluate(elapsed: Duration, config: &MonitorConfig) -> Freshness {
    let timeout = config.timeout();

    if elapsed > timeout {
        return Freshness::Expired;
    }

    if elapsed > timeout.saturating_sub(config.warning_window()) {
        let remaining_ms = (timeout - elapsed).as_millis();
        let minutes = remaining_ms.div_ceil(MINUTE_MS);
        return Freshness::Warning {
            minutes_remaining: u64::try_from(minutes).unwrap_or(u64::MAX),
        };
    }

    Freshness::Fresh
}

/// Idle time between a recorded activity and now; clock skew counts as zero
pub fn idle_duration(last_activity_ms: i64, now_ms: i64) -> Duration {
    let elapsed = now_ms.saturating_sub(last_activity_ms).max(0);
    Duration::from_millis(u64::try_from(elapsed).unwrap_or(0))
}

/// Stateful evaluator used by the monitor's polling loop
pub struct TimeoutEvaluator {
    config: MonitorConfig,
    /// Activity record that the last warning notice was issued for
    warned_for: Mutex<Option<i64>>,
}

impl TimeoutEvaluator {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            warned_for: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Evaluate a recorded activity timestamp at `now_ms`
    pub fn evaluate_at(&self, last_activity_ms: i64, now_ms: i64) -> Freshness {
        evaluate(idle_duration(last_activity_ms, now_ms), &self.config)
    }

    /// Whether a warning notice should be shown for this activity record
    ///
    /// Returns true once per record value; new activity re-arms the notice.
    pub fn claim_warning(&self, last_activity_ms: i64) -> bool {
        let mut warned = self.warned_for.lock().unwrap_or_else(PoisonError::into_inner);
        if *warned == Some(last_activity_ms) {
            return false;
        }
        *warned = Some(last_activity_ms);
        true
    }

    /// Forget any issued warning
    pub fn reset_warning(&self) {
        *self.warned_for.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

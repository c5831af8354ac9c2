//! Fixed-window rate limiting
//!
//! Each key gets a counter and a window expiry. The counter resets when the
//! window has passed, so a burst straddling a window boundary can see up to
//! twice the limit across the two windows. That is accepted behaviour of a
//! fixed-window counter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::RateLimitConfig;
use crate::error::Result;

/// Per-key counter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    /// Operations consumed in the current window
    pub count: u32,
    /// Epoch milliseconds at which the window ends
    pub reset_at: i64,
}

/// Keyed fixed-window rate limiter
pub struct RateLimiter {
    config: RateLimitConfig,
    window_ms: i64,
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    /// Create a limiter on the system clock
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter on a specific clock
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            window_ms: i64::try_from(config.window_ms).unwrap_or(i64::MAX),
            config,
            clock,
            records: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, RateLimitRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Try to use one slot for `key`
    ///
    /// Returns false when the window is exhausted. A denial does not consume
    /// a slot.
    pub fn consume(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut records = self.records();

        match records.get_mut(key) {
            Some(record) if now < record.reset_at => {
                if record.count < self.config.limit {
                    record.count += 1;
                    true
                } else {
                    debug!("Rate limit reached for '{}'", key);
                    false
                }
            }
            _ => {
                records.insert(
                    key.to_string(),
                    RateLimitRecord {
                        count: 1,
                        reset_at: now.saturating_add(self.window_ms),
                    },
                );
                true
            }
        }
    }

    /// Drop the record for `key`, allowing immediate fresh use
    pub fn reset(&self, key: &str) {
        self.records().remove(key);
    }

    /// Slots left in the current window
    pub fn remaining(&self, key: &str) -> u32 {
        let now = self.clock.now_millis();
        match self.records().get(key) {
            Some(record) if now < record.reset_at => {
                self.config.limit.saturating_sub(record.count)
            }
            _ => self.config.limit,
        }
    }

    /// Time until `key` may proceed again, or `None` if it may proceed now
    pub fn retry_after(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_millis();
        let records = self.records();
        let record = records.get(key)?;
        if now >= record.reset_at || record.count < self.config.limit {
            return None;
        }
        let wait = record.reset_at.saturating_sub(now);
        Some(Duration::from_millis(u64::try_from(wait).unwrap_or(0)))
    }

    /// Snapshot of the record for `key`
    pub fn record(&self, key: &str) -> Option<RateLimitRecord> {
        self.records().get(key).copied()
    }

    /// Remove records whose window has passed; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| now < record.reset_at);
        before - records.len()
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

//! PharmaDesk Session - idle-timeout monitoring and rate limiting
//!
//! This crate provides:
//! - Activity recording with a durable last-activity timestamp
//! - Timeout evaluation with a warning window before expiry
//! - Session invalidation against the hosted identity provider
//! - Fixed-window rate limiting for login attempts and other sensitive operations
//! - An in-memory backend for frontend-only development
//!
//! # Lifecycle
//!
//! The application shell creates one [`SessionMonitor`] per authenticated
//! session, calls [`SessionMonitor::start`] after sign-in and
//! [`SessionMonitor::stop`] (or drops it) when the session ends.

pub mod activity;
pub mod audit;
pub mod clock;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod invalidator;
pub mod mock;
pub mod monitor;
pub mod ports;
pub mod rate_limit;
pub mod sign_in;
pub mod storage;

pub use activity::{ActivityBus, ActivityRecorder};
pub use audit::AuditLogger;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MonitorConfig, RateLimitConfig};
pub use error::{AuditError, AuthError, Result, SessionError, StorageError};
pub use evaluator::{evaluate, Freshness, TimeoutEvaluator};
pub use invalidator::{InvalidationReason, SessionInvalidator};
pub use monitor::{MonitorPorts, SessionMonitor, SESSION_EXPIRED_MESSAGE};
pub use ports::{
    ActivityKind, AuditEvent, AuditSink, AuthSession, IdentityProvider, KeyValueStore, Navigator,
    Notice, NoticeAction, NoticeLevel, Notifier, SignOutScope,
};
pub use rate_limit::{RateLimitRecord, RateLimiter};
pub use sign_in::SignInGuard;
pub use storage::{FileStore, MemoryStore};

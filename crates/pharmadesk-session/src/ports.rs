//! Ports to the collaborators the session layer depends on
//!
//! The monitor never talks to the hosted backend, the browser storage or the
//! UI directly. The application shell hands in implementations of these
//! traits; [`crate::mock`] provides in-memory ones.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuthError, StorageError};

/// User interaction kinds that can count as activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 6] = [
        ActivityKind::PointerDown,
        ActivityKind::PointerMove,
        ActivityKind::KeyPress,
        ActivityKind::Scroll,
        ActivityKind::TouchStart,
        ActivityKind::Click,
    ];
}

/// An authenticated session as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Which sessions a sign-out revokes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// This device only
    Local,
    /// Every device and session of the user
    Global,
}

/// Hosted identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, if any
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError>;

    /// Revoke sessions
    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError>;

    /// Password sign-in
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError>;
}

/// Durable, origin-scoped key-value storage
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Audit log entry sent to the remote sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub resource: String,
    pub details: serde_json::Value,
    pub success: bool,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: impl Into<String>,
        resource: impl Into<String>,
        details: serde_json::Value,
        success: bool,
    ) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            details,
            success,
            at: Utc::now(),
        }
    }
}

/// Remote audit log
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_event(&self, event: AuditEvent) -> Result<(), AuditError>;
}

/// Notice severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        f.write_str(label)
    }
}

/// Action button attached to a notice
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeAction {
    /// Record activity and push the timeout back
    ExtendSession,
}

/// Toast notice
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Display time; `None` keeps the notice until dismissed
    pub duration: Option<Duration>,
    pub action: Option<NoticeAction>,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            duration: None,
            action: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_action(mut self, action: NoticeAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Toast surface
pub trait Notifier: Send + Sync {
    fn show(&self, notice: Notice);
}

/// Forced navigation
pub trait Navigator: Send + Sync {
    fn redirect_to(&self, path: &str);
}

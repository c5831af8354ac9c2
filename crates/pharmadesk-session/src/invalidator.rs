//! Session invalidation
//!
//! Clears local state first, then revokes every session of the user with the
//! identity provider. Local state is cleared even when the provider call
//! fails so no stale activity marker outlives the logout.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::activity::ActivityRecorder;
use crate::audit::AuditLogger;
use crate::error::{Result, SessionError};
use crate::ports::{AuditEvent, IdentityProvider, SignOutScope};

/// Why a session is being invalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    ManualLogout,
    TimeoutExpired,
}

impl InvalidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidationReason::ManualLogout => "manual_logout",
            InvalidationReason::TimeoutExpired => "timeout_expired",
        }
    }
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminates sessions locally and with the identity provider
pub struct SessionInvalidator {
    identity: Arc<dyn IdentityProvider>,
    recorder: Arc<ActivityRecorder>,
    audit: AuditLogger,
}

impl SessionInvalidator {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        recorder: Arc<ActivityRecorder>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            identity,
            recorder,
            audit,
        }
    }

    /// Invalidate the current session
    ///
    /// Safe to call with no session: only the local record is cleared.
    /// A failed global sign-out is returned as [`SessionError::SignOut`].
    pub async fn invalidate(&self, reason: InvalidationReason) -> Result<()> {
        self.recorder.clear();

        match self.identity.get_session().await {
            Ok(None) => {
                info!("Invalidate ({}): no active session", reason);
                return Ok(());
            }
            Ok(Some(session)) => {
                info!("Invalidating session for {} ({})", session.email, reason);
            }
            Err(e) => {
                // Unknown state: still ask the provider to revoke
                warn!("Session lookup failed during invalidation: {}", e);
            }
        }

        let result = self.identity.sign_out(SignOutScope::Global).await;

        let details = match &result {
            Ok(()) => json!({ "reason": reason.as_str() }),
            Err(e) => json!({ "reason": reason.as_str(), "error": e.to_string() }),
        };
        self.audit.record(AuditEvent::new(
            "session_invalidated",
            "session",
            details,
            result.is_ok(),
        ));

        result.map_err(|e| {
            warn!("Global sign-out failed: {}", e);
            SessionError::SignOut(e)
        })
    }
}

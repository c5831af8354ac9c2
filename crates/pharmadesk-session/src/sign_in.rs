//! Rate-limited, audited password sign-in

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::error::{Result, SessionError};
use crate::ports::{AuditEvent, AuthSession, IdentityProvider};
use crate::rate_limit::RateLimiter;

/// Throttles login attempts per e-mail address
pub struct SignInGuard {
    identity: Arc<dyn IdentityProvider>,
    limiter: RateLimiter,
    audit: AuditLogger,
}

impl SignInGuard {
    pub fn new(identity: Arc<dyn IdentityProvider>, limiter: RateLimiter, audit: AuditLogger) -> Self {
        Self {
            identity,
            limiter,
            audit,
        }
    }

    /// Rate limiter key for an e-mail address
    pub fn limiter_key(email: &str) -> String {
        format!("login:{}", normalize_email(email))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Sign in with e-mail and password
    ///
    /// Denied attempts return [`SessionError::RateLimited`] without reaching
    /// the identity provider. A successful sign-in resets the counter.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let key = Self::limiter_key(email);
        let account = normalize_email(email);
        let masked = mask_email(&account);

        if !self.limiter.consume(&key) {
            let retry_after = self.limiter.retry_after(&key).unwrap_or_default();
            warn!("Login attempts exhausted for {}", masked);
            self.audit.record(AuditEvent::new(
                "login_attempt",
                "auth",
                json!({ "email": account, "reason": "rate_limited" }),
                false,
            ));
            return Err(SessionError::RateLimited { retry_after });
        }

        match self.identity.sign_in_with_password(email, password).await {
            Ok(session) => {
                self.limiter.reset(&key);
                info!("Signed in {}", masked);
                self.audit.record(AuditEvent::new(
                    "login_attempt",
                    "auth",
                    json!({ "email": account }),
                    true,
                ));
                Ok(session)
            }
            Err(e) => {
                warn!(
                    "Login failed for {} ({} attempts left): {}",
                    masked,
                    self.limiter.remaining(&key),
                    e
                );
                self.audit.record(AuditEvent::new(
                    "login_attempt",
                    "auth",
                    json!({ "email": account, "error": e.to_string() }),
                    false,
                ));
                Err(SessionError::Auth(e))
            }
        }
    }

    /// Attempts left before the e-mail is throttled
    pub fn attempts_remaining(&self, email: &str) -> u32 {
        self.limiter.remaining(&Self::limiter_key(email))
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// E-mail form safe for diagnostic logs: `d***@clinic.test`
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => match local.chars().next() {
            Some(first) => format!("{}***@{}", first, domain),
            None => format!("***@{}", domain),
        },
        None => "***".to_string(),
    }
}

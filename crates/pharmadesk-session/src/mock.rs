//! In-memory backend for frontend-only development and tests
//!
//! Stands in for the hosted identity provider, the remote audit log and the
//! UI surfaces. Everything is inspectable so tests can assert on calls.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::error::{AuditError, AuthError, StorageError};
use crate::ports::{
    AuditEvent, AuditSink, AuthSession, IdentityProvider, KeyValueStore, Navigator, Notice,
    Notifier, SignOutScope,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct MockUser {
    id: String,
    password: String,
}

#[derive(Default)]
struct MockIdentityState {
    users: HashMap<String, MockUser>,
    session: Option<AuthSession>,
    sign_out_calls: Vec<SignOutScope>,
    sign_in_calls: usize,
    sign_out_failure: Option<AuthError>,
}

/// Identity provider backed by a fixed user table
#[derive(Default)]
pub struct MockIdentityProvider {
    state: Mutex<MockIdentityState>,
}

impl MockIdentityProvider {
    /// Session lifetime handed out by the mock
    const SESSION_HOURS: i64 = 1;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user
    pub fn add_user(&self, email: &str, password: &str) {
        lock(&self.state).users.insert(
            email.to_lowercase(),
            MockUser {
                id: Uuid::new_v4().to_string(),
                password: password.to_string(),
            },
        );
    }

    /// Make subsequent sign-outs fail with `error` (`None` restores success)
    pub fn fail_sign_out(&self, error: Option<AuthError>) {
        lock(&self.state).sign_out_failure = error;
    }

    /// Scopes of every successful or failed sign-out call
    pub fn sign_out_calls(&self) -> Vec<SignOutScope> {
        lock(&self.state).sign_out_calls.clone()
    }

    /// Number of password sign-in calls that reached the provider
    pub fn sign_in_calls(&self) -> usize {
        lock(&self.state).sign_in_calls
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn get_session(&self) -> Result<Option<AuthSession>, AuthError> {
        Ok(lock(&self.state).session.clone())
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        let mut state = lock(&self.state);
        state.sign_out_calls.push(scope);
        if let Some(error) = state.sign_out_failure.clone() {
            return Err(error);
        }
        state.session = None;
        Ok(())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, AuthError> {
        let mut state = lock(&self.state);
        state.sign_in_calls += 1;

        let normalized = email.trim().to_lowercase();
        let user_id = match state.users.get(&normalized) {
            Some(user) if user.password == password => user.id.clone(),
            _ => return Err(AuthError::InvalidCredentials),
        };

        let session = AuthSession {
            user_id,
            email: normalized,
            access_token: Uuid::new_v4().to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(Self::SESSION_HOURS),
        };
        state.session = Some(session.clone());
        Ok(session)
    }
}

/// Audit sink that keeps events in memory
#[derive(Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_event(&self, event: AuditEvent) -> Result<(), AuditError> {
        lock(&self.events).push(event);
        Ok(())
    }
}

/// Audit sink that rejects every write
pub struct FailingAuditSink;

#[async_trait]
impl AuditSink for FailingAuditSink {
    async fn log_event(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Err(AuditError::Unreachable("audit endpoint offline".into()))
    }
}

/// Store whose every operation fails
pub struct FailingStore;

impl KeyValueStore for FailingStore {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("storage quota exceeded".into()))
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage quota exceeded".into()))
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("storage quota exceeded".into()))
    }
}

/// Notifier that records every notice
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        lock(&self.notices).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show(&self, notice: Notice) {
        lock(&self.notices).push(notice);
    }
}

/// Navigator that records every redirect
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirects(&self) -> Vec<String> {
        lock(&self.redirects).clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to(&self, path: &str) {
        lock(&self.redirects).push(path.to_string());
    }
}

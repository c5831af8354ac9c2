//! End-to-end session lifecycle tests
//!
//! These tests drive the public API the way the dashboard shell does:
//! rate-limited sign-in, monitoring with file-backed storage, idle expiry,
//! manual logout and teardown.

use std::sync::Arc;
use std::time::Duration;

use pharmadesk_session::mock::{
    MemoryAuditSink, MockIdentityProvider, RecordingNavigator, RecordingNotifier,
};
use pharmadesk_session::{
    ActivityBus, ActivityKind, AuditLogger, FileStore, Freshness, IdentityProvider,
    KeyValueStore, ManualClock, MonitorConfig, MonitorPorts, NoticeAction, NoticeLevel,
    RateLimitConfig, RateLimiter, SessionError, SessionMonitor, SignInGuard,
    SESSION_EXPIRED_MESSAGE,
};
use tokio::sync::broadcast;

const T0: i64 = 1_700_000_000_000;
const EMAIL: &str = "head.pharmacist@stmarys.test";
const PASSWORD: &str = "formulary-2024";

struct World {
    clock: Arc<ManualClock>,
    identity: Arc<MockIdentityProvider>,
    audit: Arc<MemoryAuditSink>,
    notifier: Arc<RecordingNotifier>,
    navigator: Arc<RecordingNavigator>,
    store: Arc<FileStore>,
    bus: ActivityBus,
    _dir: tempfile::TempDir,
}

impl World {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("local_storage.json")).unwrap());
        let identity = Arc::new(MockIdentityProvider::new());
        identity.add_user(EMAIL, PASSWORD);

        Self {
            clock: Arc::new(ManualClock::new(T0)),
            identity,
            audit: Arc::new(MemoryAuditSink::new()),
            notifier: Arc::new(RecordingNotifier::new()),
            navigator: Arc::new(RecordingNavigator::new()),
            store,
            bus: ActivityBus::new(),
            _dir: dir,
        }
    }

    fn ports(&self) -> MonitorPorts {
        MonitorPorts {
            identity: self.identity.clone(),
            store: self.store.clone(),
            audit: self.audit.clone(),
            notifier: self.notifier.clone(),
            navigator: self.navigator.clone(),
            clock: self.clock.clone(),
        }
    }

    fn guard(&self, limit: u32) -> SignInGuard {
        let limiter = RateLimiter::with_clock(
            RateLimitConfig::new(limit, Duration::from_secs(15 * 60)),
            self.clock.clone(),
        )
        .unwrap();
        SignInGuard::new(self.identity.clone(), limiter, AuditLogger::new(self.audit.clone()))
    }

    fn monitor(&self) -> SessionMonitor {
        SessionMonitor::new(MonitorConfig::default(), self.ports(), self.bus.clone()).unwrap()
    }

    async fn advance_minutes(&self, minutes: u64) {
        for _ in 0..minutes {
            self.clock.advance(Duration::from_secs(60));
            tokio::time::advance(Duration::from_secs(60)).await;
            settle().await;
        }
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn drain(rx: &mut broadcast::Receiver<Freshness>) -> Vec<Freshness> {
    let mut out = Vec::new();
    while let Ok(decision) = rx.try_recv() {
        out.push(decision);
    }
    out
}

/// Sign in, idle through the warning window, and get logged out by timeout
#[tokio::test(start_paused = true)]
async fn test_idle_session_expires() {
    let world = World::new();

    // ==========================================
    // STEP 1: Sign in and start monitoring
    // ==========================================
    let guard = world.guard(5);
    let session = guard.sign_in(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(session.email, EMAIL);

    let mut monitor = world.monitor();
    monitor.start().unwrap();
    let mut decisions = monitor.subscribe();
    assert_eq!(
        world.store.get("pharmadesk.last_activity").unwrap().as_deref(),
        Some("1700000000000")
    );

    // ==========================================
    // STEP 2: Idle for 24 minutes: still fresh
    // ==========================================
    world.advance_minutes(24).await;
    assert_eq!(drain(&mut decisions).last(), Some(&Freshness::Fresh));
    assert!(world.notifier.notices().is_empty());

    // ==========================================
    // STEP 3: 26 minutes: warning with ~4 minutes left
    // ==========================================
    world.advance_minutes(2).await;
    assert_eq!(
        drain(&mut decisions).last(),
        Some(&Freshness::Warning { minutes_remaining: 4 })
    );
    let notices = world.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
    assert_eq!(notices[0].action, Some(NoticeAction::ExtendSession));

    // ==========================================
    // STEP 4: 31 minutes: expired and redirected
    // ==========================================
    world.advance_minutes(5).await;
    assert_eq!(drain(&mut decisions).last(), Some(&Freshness::Expired));
    assert_eq!(world.navigator.redirects(), vec!["/login".to_string()]);
    assert_eq!(
        world.notifier.notices().last().map(|n| n.message.as_str()),
        Some(SESSION_EXPIRED_MESSAGE)
    );
    assert_eq!(world.store.get("pharmadesk.last_activity").unwrap(), None);
    assert!(world.identity.get_session().await.unwrap().is_none());

    // ==========================================
    // STEP 5: Audit trail
    // ==========================================
    settle().await;
    let events = world.audit.events();
    let invalidated = events
        .iter()
        .find(|e| e.action == "session_invalidated")
        .expect("invalidation audited");
    assert_eq!(invalidated.details["reason"], "timeout_expired");
    assert!(events.iter().any(|e| e.action == "login_attempt" && e.success));
    assert!(events.iter().any(|e| e.action == "session_activity"));

    // Activity after expiry does not revive the session
    world.bus.emit(ActivityKind::Click);
    settle().await;
    assert_eq!(monitor.last_activity(), None);

    monitor.stop();
}

/// Regular interaction keeps the session alive indefinitely
#[tokio::test(start_paused = true)]
async fn test_active_user_is_never_warned() {
    let world = World::new();
    world.identity.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    let mut monitor = world.monitor();
    monitor.start().unwrap();

    for _ in 0..6 {
        world.advance_minutes(20).await;
        world.bus.emit(ActivityKind::Scroll);
        settle().await;
    }

    assert!(world.notifier.notices().is_empty());
    assert!(world.navigator.redirects().is_empty());
    assert_eq!(monitor.freshness(), Some(Freshness::Fresh));
    assert_eq!(monitor.last_activity(), Some(T0 + 120 * 60_000));
}

/// Explicit logout twice in a row is safe and clears the record both times
#[tokio::test(start_paused = true)]
async fn test_manual_logout_is_idempotent() {
    let world = World::new();
    world.guard(5).sign_in(EMAIL, PASSWORD).await.unwrap();

    let mut monitor = world.monitor();
    monitor.start().unwrap();

    monitor.logout().await.unwrap();
    assert_eq!(world.store.get("pharmadesk.last_activity").unwrap(), None);

    monitor.logout().await.unwrap();
    assert_eq!(world.store.get("pharmadesk.last_activity").unwrap(), None);

    assert_eq!(world.navigator.redirects().len(), 2);
    assert!(world
        .notifier
        .notices()
        .iter()
        .all(|n| n.message != SESSION_EXPIRED_MESSAGE));
}

/// After teardown neither events nor timers touch the session
#[tokio::test(start_paused = true)]
async fn test_teardown_stops_recording_and_polling() {
    let world = World::new();
    world.identity.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    let mut monitor = world.monitor();
    monitor.start().unwrap();
    let mut decisions = monitor.subscribe();
    world.advance_minutes(1).await;
    assert_eq!(drain(&mut decisions).len(), 1);

    drop(monitor);
    settle().await;
    assert_eq!(world.bus.listener_count(), 0);

    let before = world.store.get("pharmadesk.last_activity").unwrap();
    world.advance_minutes(1).await;
    world.bus.emit(ActivityKind::KeyPress);
    world.advance_minutes(40).await;

    assert_eq!(world.store.get("pharmadesk.last_activity").unwrap(), before);
    assert!(drain(&mut decisions).is_empty());
    assert!(world.navigator.redirects().is_empty());
}

/// The last-activity record survives a reload of the local store
#[tokio::test(start_paused = true)]
async fn test_activity_record_survives_reload() {
    let world = World::new();
    world.identity.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    let mut monitor = world.monitor();
    monitor.start().unwrap();
    world.advance_minutes(3).await;
    world.bus.emit(ActivityKind::TouchStart);
    settle().await;
    monitor.stop();

    let reopened = FileStore::open(world.store.path().clone()).unwrap();
    assert_eq!(
        reopened.get("pharmadesk.last_activity").unwrap().as_deref(),
        Some((T0 + 3 * 60_000).to_string().as_str())
    );
}

/// A record dated in the future by a skewed clock does not keep the session alive
#[tokio::test(start_paused = true)]
async fn test_future_dated_record_still_expires() {
    let world = World::new();
    world
        .store
        .set("pharmadesk.last_activity", &(T0 + 24 * 3_600_000).to_string())
        .unwrap();
    world.identity.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();

    let mut monitor = world.monitor();
    monitor.start().unwrap();
    assert_eq!(monitor.last_activity(), Some(T0));

    world.advance_minutes(31).await;
    assert!(monitor.has_expired());
    assert_eq!(world.navigator.redirects(), vec!["/login".to_string()]);
    assert_eq!(world.store.get("pharmadesk.last_activity").unwrap(), None);
}

/// Failed server sign-out is reported but local state is still cleared
#[tokio::test(start_paused = true)]
async fn test_failed_sign_out_is_reported() {
    let world = World::new();
    world.identity.sign_in_with_password(EMAIL, PASSWORD).await.unwrap();
    world.identity.fail_sign_out(Some(pharmadesk_session::AuthError::Unavailable(
        "gateway timeout".into(),
    )));

    let mut monitor = world.monitor();
    monitor.start().unwrap();

    let err = monitor.logout().await.unwrap_err();
    assert!(matches!(err, SessionError::SignOut(_)));
    assert_eq!(world.store.get("pharmadesk.last_activity").unwrap(), None);
    assert_eq!(world.navigator.redirects(), vec!["/login".to_string()]);
}

/// Throttled sign-in never reaches the provider
#[tokio::test(start_paused = true)]
async fn test_login_throttling_before_monitoring() {
    let world = World::new();
    let guard = world.guard(3);

    for _ in 0..3 {
        assert!(guard.sign_in(EMAIL, "guess").await.is_err());
    }
    assert!(matches!(
        guard.sign_in(EMAIL, PASSWORD).await,
        Err(SessionError::RateLimited { .. })
    ));
    assert_eq!(world.identity.sign_in_calls(), 3);

    world.clock.advance(Duration::from_secs(15 * 60));
    assert!(guard.sign_in(EMAIL, PASSWORD).await.is_ok());
}

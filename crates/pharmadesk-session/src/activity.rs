//! Activity recording
//!
//! The host publishes raw interaction events on an [`ActivityBus`] before any
//! UI handler sees them, so activity is recorded even for events a widget
//! consumes. The [`ActivityRecorder`] turns qualifying events into the
//! persisted last-activity timestamp.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::audit::AuditLogger;
use crate::clock::{duration_millis, Clock};
use crate::ports::{ActivityKind, AuditEvent, KeyValueStore};

/// Default activity bus capacity
const DEFAULT_BUS_CAPACITY: usize = 256;

/// Broadcast channel carrying raw interaction events
#[derive(Clone, Debug)]
pub struct ActivityBus {
    tx: broadcast::Sender<ActivityKind>,
}

impl ActivityBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an interaction event; returns false when nobody is listening
    pub fn emit(&self, kind: ActivityKind) -> bool {
        self.tx.send(kind).is_ok()
    }

    /// Subscribe to interaction events
    pub fn subscribe(&self) -> broadcast::Receiver<ActivityKind> {
        self.tx.subscribe()
    }

    /// Number of active listeners
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ActivityBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest lead a stored record may have over the clock before it is distrusted
pub const MAX_FUTURE_SKEW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct RecorderState {
    /// Time of the last activity audit write
    last_audit: Option<i64>,
    /// Set while the session is being torn down; writes are refused
    suspended: bool,
}

/// Writes the last-activity record
pub struct ActivityRecorder {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    audit: AuditLogger,
    storage_key: String,
    audit_interval_ms: i64,
    /// Serializes writes against `suspend` and `clear`
    state: Mutex<RecorderState>,
}

impl ActivityRecorder {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        audit: AuditLogger,
        storage_key: impl Into<String>,
        audit_interval: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            audit,
            storage_key: storage_key.into(),
            audit_interval_ms: duration_millis(audit_interval),
            state: Mutex::new(RecorderState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that the user is present
    ///
    /// Never fails from the caller's point of view. The stored timestamp never
    /// moves backwards within [`MAX_FUTURE_SKEW`]; a record further ahead of
    /// the clock is replaced with the current time. Does nothing while
    /// suspended.
    pub fn record_activity(&self) {
        let mut state = self.state();
        if state.suspended {
            debug!("Recorder suspended, dropping activity");
            return;
        }

        let now = self.clock.now_millis();
        let horizon = now.saturating_add(duration_millis(MAX_FUTURE_SKEW));
        let stamp = match self.last_activity() {
            Some(previous) if previous > horizon => {
                warn!(
                    "Last activity record is {} ms ahead of the clock, replacing it",
                    previous.saturating_sub(now)
                );
                now
            }
            Some(previous) if previous > now => previous,
            _ => now,
        };

        self.write(&mut state, stamp, now);
    }

    /// Lift a suspension and write the current time unconditionally
    ///
    /// Used when monitoring (re)starts, so no stored value can outlive it.
    pub fn resume(&self) {
        let mut state = self.state();
        state.suspended = false;
        let now = self.clock.now_millis();
        self.write(&mut state, now, now);
    }

    /// Refuse further writes until [`resume`](Self::resume)
    ///
    /// Waits for an in-flight write to finish, so a following
    /// [`clear`](Self::clear) cannot be overtaken by it.
    pub fn suspend(&self) {
        self.state().suspended = true;
    }

    pub fn is_suspended(&self) -> bool {
        self.state().suspended
    }

    fn write(&self, state: &mut RecorderState, stamp: i64, now: i64) {
        match self.store.set(&self.storage_key, &stamp.to_string()) {
            Ok(()) => debug!("Recorded activity at {}", stamp),
            Err(e) => warn!("Failed to persist last activity: {}", e),
        }

        let due = match state.last_audit {
            Some(at) => now.saturating_sub(at) >= self.audit_interval_ms,
            None => true,
        };
        if due {
            state.last_audit = Some(now);
            self.audit.record(AuditEvent::new(
                "session_activity",
                "session",
                json!({ "timestamp": stamp }),
                true,
            ));
        }
    }

    /// Read the last-activity record, if present and well-formed
    pub fn last_activity(&self) -> Option<i64> {
        let raw = match self.store.get(&self.storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read last activity: {}", e);
                return None;
            }
        };

        match raw.trim().parse::<i64>() {
            Ok(stamp) => Some(stamp),
            Err(_) => {
                warn!("Ignoring malformed last activity record {:?}", raw);
                None
            }
        }
    }

    /// Delete the last-activity record
    pub fn clear(&self) {
        let mut state = self.state();
        state.last_audit = None;

        if let Err(e) = self.store.remove(&self.storage_key) {
            warn!("Failed to clear last activity: {}", e);
        }
    }

    /// Current time according to the recorder's clock
    pub(crate) fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::{FailingStore, MemoryAuditSink};
    use crate::storage::MemoryStore;
    use proptest::prelude::*;

    const KEY: &str = "pharmadesk.last_activity";

    fn recorder(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<ManualClock>,
        sink: Arc<MemoryAuditSink>,
    ) -> ActivityRecorder {
        ActivityRecorder::new(
            store,
            clock,
            AuditLogger::new(sink),
            KEY,
            Duration::from_secs(60),
        )
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_record_writes_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let recorder = recorder(store.clone(), clock, Arc::new(MemoryAuditSink::new()));

        assert_eq!(recorder.last_activity(), None);
        recorder.record_activity();
        assert_eq!(recorder.last_activity(), Some(1_700_000_000_000));
        assert_eq!(store.get(KEY).unwrap().as_deref(), Some("1700000000000"));
    }

    #[tokio::test]
    async fn test_timestamp_never_moves_backwards() {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(10_000));
        let recorder = recorder(store, clock.clone(), Arc::new(MemoryAuditSink::new()));

        recorder.record_activity();
        clock.set(5_000);
        recorder.record_activity();
        assert_eq!(recorder.last_activity(), Some(10_000));
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let sink = Arc::new(MemoryAuditSink::new());
        let recorder = recorder(
            Arc::new(FailingStore),
            Arc::new(ManualClock::new(0)),
            sink.clone(),
        );

        recorder.record_activity();
        assert_eq!(recorder.last_activity(), None);

        // The audit write is independent of the local write
        settle().await;
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_activity_audit_is_throttled() {
        let sink = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(0));
        let recorder = recorder(Arc::new(MemoryStore::new()), clock.clone(), sink.clone());

        recorder.record_activity();
        clock.advance(Duration::from_secs(10));
        recorder.record_activity();
        clock.advance(Duration::from_secs(50));
        recorder.record_activity();
        settle().await;

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.action == "session_activity"));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_block_local_write() {
        let recorder = ActivityRecorder::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(42)),
            AuditLogger::new(Arc::new(crate::mock::FailingAuditSink)),
            KEY,
            Duration::from_secs(60),
        );
        recorder.record_activity();
        settle().await;
        assert_eq!(recorder.last_activity(), Some(42));
    }

    #[tokio::test]
    async fn test_clear_removes_record() {
        let store = Arc::new(MemoryStore::new());
        let recorder = recorder(
            store.clone(),
            Arc::new(ManualClock::new(1)),
            Arc::new(MemoryAuditSink::new()),
        );
        recorder.record_activity();
        recorder.clear();
        assert_eq!(recorder.last_activity(), None);
        recorder.clear();
        assert_eq!(store.get(KEY).unwrap(), None);
    }

    #[test]
    fn test_malformed_record_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, "yesterday").unwrap();
        let recorder = recorder(
            store,
            Arc::new(ManualClock::new(1)),
            Arc::new(MemoryAuditSink::new()),
        );
        assert_eq!(recorder.last_activity(), None);
    }

    #[tokio::test]
    async fn test_far_future_record_is_replaced() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, &(86_400_000 + 1_000).to_string()).unwrap();
        let recorder = recorder(
            store,
            Arc::new(ManualClock::new(1_000)),
            Arc::new(MemoryAuditSink::new()),
        );

        recorder.record_activity();
        assert_eq!(recorder.last_activity(), Some(1_000));
    }

    #[tokio::test]
    async fn test_resume_overwrites_any_stored_value() {
        let store = Arc::new(MemoryStore::new());
        store.set(KEY, "31000").unwrap();
        let recorder = recorder(
            store,
            Arc::new(ManualClock::new(1_000)),
            Arc::new(MemoryAuditSink::new()),
        );

        recorder.resume();
        assert_eq!(recorder.last_activity(), Some(1_000));
    }

    #[tokio::test]
    async fn test_suspended_recorder_drops_activity() {
        let clock = Arc::new(ManualClock::new(1_000));
        let recorder = recorder(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            Arc::new(MemoryAuditSink::new()),
        );

        recorder.record_activity();
        recorder.suspend();
        recorder.clear();
        clock.advance(Duration::from_secs(5));
        recorder.record_activity();
        assert!(recorder.is_suspended());
        assert_eq!(recorder.last_activity(), None);

        recorder.resume();
        assert!(!recorder.is_suspended());
        assert_eq!(recorder.last_activity(), Some(6_000));
    }

    /// Store whose `set` blocks until released
    struct GatedStore {
        inner: MemoryStore,
        entered: Mutex<std::sync::mpsc::Sender<()>>,
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl KeyValueStore for GatedStore {
        fn get(&self, key: &str) -> Result<Option<String>, crate::error::StorageError> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), crate::error::StorageError> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self.release.lock().unwrap().recv();
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> Result<(), crate::error::StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn test_clear_after_suspend_wins_over_inflight_write() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let recorder = Arc::new(recorder(
            store.clone(),
            Arc::new(ManualClock::new(1_000)),
            Arc::new(MemoryAuditSink::new()),
        ));

        let writer = {
            let recorder = Arc::clone(&recorder);
            std::thread::spawn(move || recorder.record_activity())
        };
        entered_rx.recv().unwrap();

        let teardown = {
            let recorder = Arc::clone(&recorder);
            std::thread::spawn(move || {
                recorder.suspend();
                recorder.clear();
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();

        writer.join().unwrap();
        teardown.join().unwrap();
        assert_eq!(store.inner.get(KEY).unwrap(), None);

        // Later activity is refused without touching the store
        recorder.record_activity();
        assert_eq!(store.inner.get(KEY).unwrap(), None);
    }

    #[test]
    fn test_bus_without_listeners() {
        let bus = ActivityBus::new();
        assert!(!bus.emit(ActivityKind::Click));
        let _rx = bus.subscribe();
        assert_eq!(bus.listener_count(), 1);
        assert!(bus.emit(ActivityKind::Click));
    }

    proptest! {
        #[test]
        fn prop_recorded_timestamp_is_monotonic(times in prop::collection::vec(0i64..60_000, 1..50)) {
            let clock = Arc::new(ManualClock::new(0));
            let recorder = recorder(
                Arc::new(MemoryStore::new()),
                clock.clone(),
                Arc::new(MemoryAuditSink::new()),
            );

            let mut highest = i64::MIN;
            for t in times {
                clock.set(t);
                recorder.record_activity();
                let read = recorder.last_activity().unwrap();
                prop_assert!(read >= highest);
                prop_assert!(read >= t);
                highest = read;
            }
        }
    }
}

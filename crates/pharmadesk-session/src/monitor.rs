//! Session activity monitor
//!
//! Owns the two background tasks of an authenticated session: the activity
//! listener feeding the [`ActivityRecorder`] and the polling loop running the
//! [`TimeoutEvaluator`]. Both are released by [`SessionMonitor::stop`], which
//! also runs on drop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::activity::{ActivityBus, ActivityRecorder};
use crate::audit::AuditLogger;
use crate::clock::Clock;
use crate::config::MonitorConfig;
use crate::error::{Result, SessionError};
use crate::evaluator::{Freshness, TimeoutEvaluator};
use crate::invalidator::{InvalidationReason, SessionInvalidator};
use crate::ports::{
    AuditSink, IdentityProvider, KeyValueStore, Navigator, Notice, NoticeAction, Notifier,
};

/// Notice shown when the session has timed out
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Capacity of the decision broadcast channel
const SIGNAL_CAPACITY: usize = 64;

/// Collaborators handed in by the application shell
#[derive(Clone)]
pub struct MonitorPorts {
    pub identity: Arc<dyn IdentityProvider>,
    pub store: Arc<dyn KeyValueStore>,
    pub audit: Arc<dyn AuditSink>,
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
    pub clock: Arc<dyn Clock>,
}

/// Warning notice text
pub fn warning_message(minutes_remaining: u64) -> String {
    let unit = if minutes_remaining == 1 { "minute" } else { "minutes" };
    format!(
        "Your session will expire in {} {} due to inactivity.",
        minutes_remaining, unit
    )
}

struct MonitorInner {
    config: MonitorConfig,
    recorder: Arc<ActivityRecorder>,
    evaluator: TimeoutEvaluator,
    invalidator: SessionInvalidator,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    signals: broadcast::Sender<Freshness>,
    /// Set once the session has expired; silences the listener and the loop
    ended: AtomicBool,
}

impl MonitorInner {
    /// One evaluator tick; `None` when there is no activity record yet
    async fn tick(&self) -> Option<Freshness> {
        let last_activity = self.recorder.last_activity()?;
        let decision = self
            .evaluator
            .evaluate_at(last_activity, self.recorder.now_millis());

        match decision {
            Freshness::Fresh => {}
            Freshness::Warning { minutes_remaining } => {
                if self.evaluator.claim_warning(last_activity) {
                    info!("Session expires in {} minute(s)", minutes_remaining);
                    self.notifier.show(
                        Notice::warning(warning_message(minutes_remaining))
                            .with_duration(self.config.warning_notice_duration())
                            .with_action(NoticeAction::ExtendSession),
                    );
                }
            }
            Freshness::Expired => self.expire().await,
        }

        let _ = self.signals.send(decision);
        Some(decision)
    }

    async fn expire(&self) {
        info!("Session idle for longer than {:?}, expiring", self.config.timeout());
        self.ended.store(true, Ordering::SeqCst);
        self.recorder.suspend();

        if let Err(e) = self
            .invalidator
            .invalidate(InvalidationReason::TimeoutExpired)
            .await
        {
            warn!("Expiry invalidation incomplete: {}", e);
        }
        self.evaluator.reset_warning();

        self.notifier.show(Notice::error(SESSION_EXPIRED_MESSAGE));
        self.navigator.redirect_to(&self.config.login_path);
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}

/// Idle-timeout monitor for one authenticated session
pub struct SessionMonitor {
    inner: Arc<MonitorInner>,
    bus: ActivityBus,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionMonitor {
    /// Build a monitor listening on `bus`
    pub fn new(config: MonitorConfig, ports: MonitorPorts, bus: ActivityBus) -> Result<Self> {
        config.validate()?;

        let audit = AuditLogger::new(ports.audit);
        let recorder = Arc::new(ActivityRecorder::new(
            ports.store,
            ports.clock,
            audit.clone(),
            config.storage_key.clone(),
            config.activity_audit_interval(),
        ));
        let invalidator = SessionInvalidator::new(ports.identity, Arc::clone(&recorder), audit);
        let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);

        Ok(Self {
            inner: Arc::new(MonitorInner {
                evaluator: TimeoutEvaluator::new(config.clone()),
                config,
                recorder,
                invalidator,
                notifier: ports.notifier,
                navigator: ports.navigator,
                signals,
                ended: AtomicBool::new(false),
            }),
            bus,
            tasks: Vec::new(),
        })
    }

    /// Start listening for activity and polling for timeouts
    ///
    /// Writes the current time as the activity record immediately, replacing
    /// whatever was stored. Starting a running monitor is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.stop();

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::Runtime(e.to_string()))?;

        self.inner.ended.store(false, Ordering::SeqCst);
        self.inner.evaluator.reset_warning();
        self.inner.recorder.resume();

        // Subscribe before spawning so no event published after start is missed
        let mut events = self.bus.subscribe();
        let inner = Arc::clone(&self.inner);
        let listener = handle.spawn(async move {
            loop {
                match events.recv().await {
                    // The recorder refuses writes once expiry or logout began
                    Ok(kind) => {
                        if inner.config.tracks(kind) {
                            inner.recorder.record_activity();
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Activity listener lagged by {} events", skipped);
                        inner.recorder.record_activity();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let inner = Arc::clone(&self.inner);
        let period = self.inner.config.poll_interval();
        // Anchored to start(), not to the first poll of the task
        let first_tick = Instant::now() + period;
        let poller = handle.spawn(async move {
            let mut interval = tokio::time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                inner.tick().await;
                if inner.is_ended() {
                    break;
                }
            }
        });

        self.tasks = vec![listener, poller];
        info!(
            "Session monitor started (timeout {:?}, poll {:?})",
            self.inner.config.timeout(),
            period
        );
        Ok(())
    }

    /// Stop both background tasks
    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Session monitor stopped");
    }

    /// Whether the background tasks are alive
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|task| !task.is_finished())
    }

    /// Whether the session ended by timing out
    pub fn has_expired(&self) -> bool {
        self.inner.is_ended()
    }

    /// User accepted the "extend session" action
    pub fn extend_session(&self) {
        if self.inner.is_ended() {
            debug!("Ignoring extend request on an expired session");
            return;
        }
        self.inner.recorder.record_activity();
        self.inner.evaluator.reset_warning();
    }

    /// Explicit logout: stop monitoring, invalidate, redirect
    ///
    /// The redirect happens even if the global sign-out fails; the error is
    /// still returned.
    pub async fn logout(&mut self) -> Result<()> {
        self.stop();
        self.inner.recorder.suspend();
        let result = self
            .inner
            .invalidator
            .invalidate(InvalidationReason::ManualLogout)
            .await;
        self.inner.evaluator.reset_warning();
        self.inner.navigator.redirect_to(&self.inner.config.login_path);
        result
    }

    /// Run one evaluation immediately, with the same effects as a timer tick
    pub async fn evaluate_now(&self) -> Option<Freshness> {
        self.inner.tick().await
    }

    /// Current decision without side effects
    pub fn freshness(&self) -> Option<Freshness> {
        let last = self.inner.recorder.last_activity()?;
        Some(
            self.inner
                .evaluator
                .evaluate_at(last, self.inner.recorder.now_millis()),
        )
    }

    /// Last recorded activity (epoch milliseconds)
    pub fn last_activity(&self) -> Option<i64> {
        self.inner.recorder.last_activity()
    }

    /// Subscribe to evaluator decisions
    pub fn subscribe(&self) -> broadcast::Receiver<Freshness> {
        self.inner.signals.subscribe()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

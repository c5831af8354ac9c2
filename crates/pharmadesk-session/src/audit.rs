//! Best-effort audit logging
//!
//! Audit writes never sit on the critical path: [`AuditLogger::record`]
//! spawns the write and logs failures locally.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::ports::{AuditEvent, AuditSink};

/// Fire-and-forget wrapper around an [`AuditSink`]
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Send an event without waiting for the result
    ///
    /// Returns the spawned task, or `None` when called outside a tokio
    /// runtime (the event is dropped with a warning).
    pub fn record(&self, event: AuditEvent) -> Option<JoinHandle<()>> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime for audit write, dropping '{}' event", event.action);
                return None;
            }
        };

        let sink = Arc::clone(&self.sink);
        Some(handle.spawn(async move {
            let action = event.action.clone();
            match sink.log_event(event).await {
                Ok(()) => debug!("Audit event '{}' written", action),
                Err(e) => warn!("Audit write for '{}' failed: {}", action, e),
            }
        }))
    }
}

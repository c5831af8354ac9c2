//! Terminal implementations of the UI ports

use async_trait::async_trait;
use tracing::info;

use pharmadesk_session::{AuditError, AuditEvent, AuditSink, Navigator, Notice, NoticeAction, NoticeLevel, Notifier};

/// Icon for a notice level
fn icon(level: NoticeLevel) -> &'static str {
    match level {
        NoticeLevel::Info => "ℹ",
        NoticeLevel::Success => "✓",
        NoticeLevel::Warning => "⚠",
        NoticeLevel::Error => "✗",
    }
}

/// Render a notice as a single terminal line
pub fn format_notice(notice: &Notice) -> String {
    let mut line = format!("{} {}", icon(notice.level), notice.message);
    if let Some(NoticeAction::ExtendSession) = notice.action {
        line.push_str("  [type `extend` to stay signed in]");
    }
    line
}

/// Prints notices to stdout
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn show(&self, notice: Notice) {
        println!("{}", format_notice(&notice));
    }
}

/// Prints redirects to stdout
pub struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect_to(&self, path: &str) {
        println!("→ redirected to {}", path);
    }
}

/// Audit sink that writes events to the local log
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log_event(&self, event: AuditEvent) -> Result<(), AuditError> {
        info!(
            target: "pharmadesk::audit",
            action = %event.action,
            resource = %event.resource,
            success = event.success,
            details = %event.details,
            "audit"
        );
        Ok(())
    }
}

//! Interactive session loop
//!
//! Every line typed that is not a command counts as a key press on the
//! activity bus, so leaving the terminal alone lets the session time out.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use pharmadesk_session::evaluator::idle_duration;
use pharmadesk_session::mock::MockIdentityProvider;
use pharmadesk_session::{
    ActivityBus, ActivityKind, AuditLogger, Freshness, MonitorPorts, Notice, Notifier,
    RateLimiter, SessionError, SessionMonitor, SignInGuard, SystemClock,
};

use crate::config::ShellConfig;
use crate::terminal::{TerminalNavigator, TerminalNotifier, TracingAuditSink};

const HELP: &str = "\
Commands:
  login <email> <password>   sign in
  logout                     sign out everywhere
  extend                     extend the current session
  status                     show session state
  help                       show this help
  quit                       exit
Anything else counts as activity.";

/// A parsed input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Logout,
    Extend,
    Status,
    Help,
    Quit,
    Activity,
}

/// Parse one input line
pub fn parse_line(line: &str) -> std::result::Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(Command::Activity);
    };

    match head {
        "login" => match (parts.next(), parts.next(), parts.next()) {
            (Some(email), Some(password), None) => Ok(Command::Login {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => Err("usage: login <email> <password>".to_string()),
        },
        "logout" => Ok(Command::Logout),
        "extend" => Ok(Command::Extend),
        "status" => Ok(Command::Status),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        _ => Ok(Command::Activity),
    }
}

/// Message shown inline when a login is throttled
pub fn rate_limited_message(retry_after_secs: u64) -> String {
    let minutes = retry_after_secs.div_ceil(60).max(1);
    format!(
        "Too many login attempts. Please try again in {} minute{}.",
        minutes,
        if minutes == 1 { "" } else { "s" }
    )
}

enum Flow {
    Continue,
    Quit,
}

/// Shell state: one identity backend, at most one live monitor
pub struct Shell {
    config: ShellConfig,
    ports: MonitorPorts,
    guard: SignInGuard,
    bus: ActivityBus,
    monitor: Option<SessionMonitor>,
    signals: Option<broadcast::Receiver<Freshness>>,
}

impl Shell {
    pub fn new(config: ShellConfig, store: Arc<dyn pharmadesk_session::KeyValueStore>) -> Result<Self> {
        let identity = Arc::new(MockIdentityProvider::new());
        for user in &config.demo_users {
            identity.add_user(&user.email, &user.password);
        }

        let ports = MonitorPorts {
            identity: identity.clone(),
            store,
            audit: Arc::new(TracingAuditSink),
            notifier: Arc::new(TerminalNotifier),
            navigator: Arc::new(TerminalNavigator),
            clock: Arc::new(SystemClock),
        };

        let limiter = RateLimiter::new(config.login_rate_limit)?;
        let guard = SignInGuard::new(identity, limiter, AuditLogger::new(ports.audit.clone()));

        Ok(Self {
            config,
            ports,
            guard,
            bus: ActivityBus::new(),
            monitor: None,
            signals: None,
        })
    }

    /// Run until `quit` or end of input
    pub async fn run(&mut self) -> Result<()> {
        println!("PharmaDesk session shell. Type `help` for commands.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    if let Flow::Quit = self.handle_line(&line).await {
                        break;
                    }
                }
                decision = next_signal(&mut self.signals) => {
                    match decision {
                        Some(Freshness::Expired) => self.end_session(),
                        Some(_) => {}
                        None => self.signals = None,
                    }
                }
            }
        }

        self.end_session();
        info!("Shell exiting");
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> Flow {
        let command = match parse_line(line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{}", usage);
                return Flow::Continue;
            }
        };

        match command {
            Command::Login { email, password } => self.login(&email, &password).await,
            Command::Logout => self.logout().await,
            Command::Extend => match &self.monitor {
                Some(monitor) => {
                    monitor.extend_session();
                    println!("Session extended.");
                }
                None => println!("Not signed in."),
            },
            Command::Status => self.print_status(),
            Command::Help => println!("{}", HELP),
            Command::Quit => return Flow::Quit,
            Command::Activity => {
                self.bus.emit(ActivityKind::KeyPress);
            }
        }
        Flow::Continue
    }

    async fn login(&mut self, email: &str, password: &str) {
        if self.monitor.is_some() {
            println!("Already signed in. Use `logout` first.");
            return;
        }

        match self.guard.sign_in(email, password).await {
            Ok(session) => match self.start_monitor() {
                Ok(()) => println!("Signed in as {}.", session.email),
                Err(e) => println!("Signed in, but session monitoring failed: {}", e),
            },
            Err(SessionError::RateLimited { retry_after }) => {
                self.ports
                    .notifier
                    .show(Notice::error(rate_limited_message(retry_after.as_secs())));
            }
            Err(e) => {
                let left = self.guard.attempts_remaining(email);
                println!("Login failed: {} ({} attempt(s) left)", e, left);
            }
        }
    }

    fn start_monitor(&mut self) -> pharmadesk_session::Result<()> {
        let mut monitor =
            SessionMonitor::new(self.config.monitor.clone(), self.ports.clone(), self.bus.clone())?;
        monitor.start()?;
        self.signals = Some(monitor.subscribe());
        self.monitor = Some(monitor);
        Ok(())
    }

    async fn logout(&mut self) {
        let Some(mut monitor) = self.monitor.take() else {
            println!("Not signed in.");
            return;
        };
        self.signals = None;

        match monitor.logout().await {
            Ok(()) => println!("Signed out."),
            Err(e) => {
                warn!("Logout incomplete: {}", e);
                println!("Signed out locally; the server sign-out failed: {}", e);
            }
        }
    }

    fn end_session(&mut self) {
        self.signals = None;
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    fn print_status(&self) {
        let Some(monitor) = &self.monitor else {
            println!("Not signed in.");
            return;
        };

        let Some(last) = monitor.last_activity() else {
            println!("Signed in, no activity recorded.");
            return;
        };

        let idle = idle_duration(last, chrono::Utc::now().timestamp_millis());
        let state = match monitor.freshness() {
            Some(Freshness::Fresh) | None => "active".to_string(),
            Some(Freshness::Warning { minutes_remaining }) => {
                format!("expiring in {} min", minutes_remaining)
            }
            Some(Freshness::Expired) => "expired".to_string(),
        };
        let last_at = chrono::DateTime::from_timestamp_millis(last)
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| last.to_string());

        println!(
            "Session {} (last activity {}, idle {}s, timeout {}s)",
            state,
            last_at,
            idle.as_secs(),
            monitor.config().timeout_secs
        );
    }
}

async fn next_signal(signals: &mut Option<broadcast::Receiver<Freshness>>) -> Option<Freshness> {
    let Some(rx) = signals else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(decision) => return Some(decision),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}

//! Shell configuration persistence

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use pharmadesk_session::config::{load_json, save_json};
use pharmadesk_session::{MonitorConfig, RateLimitConfig};

/// Environment variable overriding the config location
pub const CONFIG_ENV: &str = "PHARMADESK_CONFIG";

/// Configuration file name
const CONFIG_FILE_NAME: &str = "shell.json";

/// Directory under the platform config/data dirs
const APP_DIR_NAME: &str = "pharmadesk";

/// Account accepted by the mock identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoUser {
    pub email: String,
    pub password: String,
}

impl DemoUser {
    /// Parse `email:password`
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((email, password)) = raw.split_once(':') else {
            bail!("demo user must be EMAIL:PASSWORD, got {:?}", raw);
        };
        if email.trim().is_empty() || password.is_empty() {
            bail!("demo user needs both an e-mail and a password");
        }
        Ok(Self {
            email: email.trim().to_string(),
            password: password.to_string(),
        })
    }
}

/// Shell configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Idle-timeout settings
    pub monitor: MonitorConfig,

    /// Login throttling per e-mail
    pub login_rate_limit: RateLimitConfig,

    /// Durable local storage file
    pub storage_path: PathBuf,

    /// Accounts for the mock identity provider
    pub demo_users: Vec<DemoUser>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            monitor: MonitorConfig::default(),
            login_rate_limit: RateLimitConfig::login(),
            storage_path: default_storage_path(),
            demo_users: vec![DemoUser {
                email: "admin@pharmadesk.local".to_string(),
                password: "change-me".to_string(),
            }],
        }
    }
}

impl ShellConfig {
    /// Load from `path`, writing a default file when none exists
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            load_json(path).with_context(|| format!("Failed to load config {:?}", path))?
        } else {
            let config = Self::default();
            save_json(&config, path)
                .with_context(|| format!("Failed to write default config {:?}", path))?;
            info!("Created default config at {:?}", path);
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_json(self, path).with_context(|| format!("Failed to save config {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        self.monitor.validate().context("Invalid monitor settings")?;
        self.login_rate_limit
            .validate()
            .context("Invalid login rate limit")?;
        Ok(())
    }
}

/// Pick the config file: explicit flag, then environment, then platform dir
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR_NAME)
                .join(CONFIG_FILE_NAME)
        })
}

fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("local_storage.json")
}

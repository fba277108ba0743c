//! Configuration for mailquota-rs

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, UsageError};
use crate::resolver::DEFAULT_MAILBOX;
use crate::transport::{ConnectionParameters, DEFAULT_IMAP_PORT};

/// Main service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// IMAP client behaviour
    #[serde(default)]
    pub imap: ImapConfig,
    /// Batch endpoint behaviour
    #[serde(default)]
    pub batch: BatchConfig,
    /// Account served by `GET /mailbox` (optional)
    pub account: Option<AccountConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:3000")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// IMAP client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImapConfig {
    /// Mailbox whose quota root and size are reported
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Connect + login timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

/// Batch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Accounts resolved at the same time (1 = one after another)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Default IMAP account
#[derive(Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    #[serde(default = "default_tls")]
    pub tls: bool,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("tls", &self.tls)
            .finish_non_exhaustive()
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_mailbox() -> String {
    DEFAULT_MAILBOX.to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_concurrency() -> usize {
    1
}

fn default_imap_port() -> u16 {
    DEFAULT_IMAP_PORT
}

fn default_tls() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            mailbox: default_mailbox(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl AccountConfig {
    /// Connection parameters for this account
    pub fn params(&self) -> ConnectionParameters {
        ConnectionParameters {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            tls: self.tls,
        }
    }
}

impl ImapConfig {
    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| UsageError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| UsageError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Create a default development configuration
    pub fn development() -> Self {
        Self {
            server: ServerConfig::default(),
            imap: ImapConfig::default(),
            batch: BatchConfig::default(),
            account: None,
        }
    }

    /// Apply `IMAP_*` and `PORT` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|e| UsageError::Config(format!("Invalid PORT '{}': {}", port, e)))?;
            let addr: SocketAddr = self
                .server
                .listen_addr
                .parse()
                .map_err(|e| UsageError::Config(format!("Invalid listen address: {}", e)))?;
            self.server.listen_addr = SocketAddr::new(addr.ip(), port).to_string();
        }

        let user = lookup("IMAP_USER");
        let password = lookup("IMAP_PASSWORD");
        let host = lookup("IMAP_HOST");

        if let Some(account) = self.account.as_mut() {
            if let Some(user) = user {
                account.user = user;
            }
            if let Some(password) = password {
                account.password = password;
            }
            if let Some(host) = host {
                account.host = host;
            }
        } else if let (Some(user), Some(password), Some(host)) = (user, password, host) {
            self.account = Some(AccountConfig {
                host,
                port: DEFAULT_IMAP_PORT,
                user,
                password,
                tls: true,
            });
        }

        if let Some(account) = self.account.as_mut() {
            if let Some(port) = lookup("IMAP_PORT") {
                account.port = port
                    .parse()
                    .map_err(|e| UsageError::Config(format!("Invalid IMAP_PORT '{}': {}", port, e)))?;
            }
            if let Some(tls) = lookup("IMAP_TLS") {
                account.tls = parse_bool(&tls)
                    .ok_or_else(|| UsageError::Config(format!("Invalid IMAP_TLS '{}'", tls)))?;
            }
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.server
            .listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| {
                UsageError::Config(format!(
                    "Invalid listen address '{}': {}",
                    self.server.listen_addr, e
                ))
            })?;

        if self.imap.mailbox.trim().is_empty() {
            return Err(UsageError::Config("Mailbox name is empty".to_string()));
        }

        if self.imap.connect_timeout_seconds == 0 {
            return Err(UsageError::Config("Connect timeout must be positive".to_string()));
        }

        if self.batch.concurrency == 0 {
            return Err(UsageError::Config("Batch concurrency must be at least 1".to_string()));
        }

        if let Some(ref account) = self.account {
            if account.host.is_empty() || account.user.is_empty() || account.password.is_empty() {
                return Err(UsageError::Config(
                    "Default account needs host, user and password".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::development()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

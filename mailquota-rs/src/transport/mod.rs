//! IMAP transport abstraction
//!
//! The resolver only needs five primitives from an IMAP connection. They are
//! expressed as traits so the resolver can run against a real server
//! ([`imap::ImapTransport`]) or a scripted one ([`mock::MockTransport`]).

use futures::stream::BoxStream;
use serde::Deserialize;
use std::fmt;

use crate::error::TransportError;

pub mod imap;
pub mod mock;

/// Raw quota root response. Its layout depends on the server.
pub type RawQuotaResponse = serde_json::Value;

/// Default IMAPS port
pub const DEFAULT_IMAP_PORT: u16 = 993;

/// Parameters for one IMAP connection
#[derive(Clone, Deserialize)]
pub struct ConnectionParameters {
    /// IMAP server hostname
    pub host: String,
    /// IMAP server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login name
    pub user: String,
    /// Login password
    pub password: String,
    /// Use implicit TLS
    #[serde(default = "default_tls")]
    pub tls: bool,
}

fn default_port() -> u16 {
    DEFAULT_IMAP_PORT
}

fn default_tls() -> bool {
    true
}

impl ConnectionParameters {
    /// Parameters for an implicit-TLS connection on the default port
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_IMAP_PORT,
            user: user.into(),
            password: password.into(),
            tls: true,
        }
    }
}

impl fmt::Debug for ConnectionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParameters")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("tls", &self.tls)
            .finish()
    }
}

/// Result of opening a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox
    pub message_count: u32,
}

/// Size attribute of one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageSize {
    /// Message sequence number
    pub sequence: u32,
    /// RFC822.SIZE in bytes
    pub size_bytes: u64,
}

/// Lazy, finite, non-restartable stream of message sizes
pub type SizeStream<'a> = BoxStream<'a, Result<MessageSize, TransportError>>;

/// Opens sessions to an IMAP server
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    /// Session type produced by this transport
    type Session: MailSession;

    /// Connect and authenticate. Single attempt.
    async fn connect(&self, params: &ConnectionParameters) -> Result<Self::Session, TransportError>;
}

/// An authenticated IMAP session owned by one resolution
#[async_trait::async_trait]
pub trait MailSession: Send {
    /// GETQUOTAROOT for the given mailbox
    async fn get_quota_root(&mut self, mailbox: &str) -> Result<RawQuotaResponse, TransportError>;

    /// Open a mailbox, read-only (EXAMINE) or read-write (SELECT)
    async fn open_mailbox(&mut self, name: &str, read_only: bool) -> Result<MailboxStatus, TransportError>;

    /// Fetch only the size attribute for a sequence range
    async fn fetch_sizes<'a>(&'a mut self, range: &str) -> Result<SizeStream<'a>, TransportError>;

    /// Close the session. Safe to call more than once.
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let params = ConnectionParameters::new("imap.example.com", "alice", "hunter2");
        let debug = format!("{:?}", params);
        assert!(debug.contains("imap.example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let params: ConnectionParameters = serde_json::from_str(
            r#"{"host": "imap.example.com", "user": "alice", "password": "secret"}"#,
        )
        .unwrap();
        assert_eq!(params.port, 993);
        assert!(params.tls);
    }
}

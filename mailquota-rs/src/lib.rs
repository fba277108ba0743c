//! mailquota-rs: IMAP mailbox usage over HTTP
//!
//! Connects to an IMAP server on demand and reports how much storage a
//! mailbox uses.
//!
//! # Features
//!
//! - Storage quota via GETQUOTAROOT, normalized across server response layouts
//! - Fallback to summing message sizes when no quota is available
//! - Single-account and batch endpoints
//! - One connection per lookup, always logged out afterwards
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! listen_addr = "0.0.0.0:3000"
//!
//! [imap]
//! mailbox = "INBOX"
//! connect_timeout_seconds = 30
//!
//! [batch]
//! concurrency = 1
//!
//! [account]
//! host = "imap.example.com"
//! user = "alice@example.com"
//! password = "secret"
//! ```

pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod manual;
pub mod quota;
pub mod resolver;
pub mod transport;

pub use config::ServiceConfig;
pub use error::{Result, UsageError};
pub use resolver::{UsageResolver, UsageResult};

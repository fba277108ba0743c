//! Error types for mailquota-rs

use std::time::Duration;
use thiserror::Error;

/// Result type alias for usage resolution
pub type Result<T> = std::result::Result<T, UsageError>;

/// Errors raised by the IMAP transport
#[derive(Error, Debug)]
pub enum TransportError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// IMAP protocol error reported by the client library
    #[error("IMAP error: {0}")]
    Imap(#[from] async_imap::error::Error),

    /// TLS setup or handshake error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connect did not complete in time
    #[error("Connection to {host} timed out after {}s", .after.as_secs())]
    Timeout { host: String, after: Duration },

    /// Server answered with something unexpected
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Session was used after disconnect
    #[error("Session is closed")]
    Closed,
}

/// Why quota resolution did not produce a report.
///
/// Never leaves the resolver on its own; it only selects the manual fallback.
#[derive(Error, Debug)]
pub enum QuotaParseFailure {
    /// The quota root query itself failed (e.g. no QUOTA extension)
    #[error("quota query failed: {0}")]
    Query(#[source] TransportError),

    /// Response matched none of the known shapes
    #[error("storage quota not found in response")]
    UnrecognizedShape,

    /// A storage entry was found but its limit is zero
    #[error("storage quota has a zero limit")]
    ZeroLimit,
}

/// Failure of the manual size computation
#[derive(Error, Debug)]
pub enum ManualComputationError {
    /// Mailbox could not be opened
    #[error("failed to open mailbox {mailbox}: {source}")]
    OpenMailbox {
        mailbox: String,
        #[source]
        source: TransportError,
    },

    /// Size enumeration failed part way
    #[error("failed to fetch message sizes: {0}")]
    Fetch(#[source] TransportError),
}

/// Errors surfaced by the usage resolver and the service around it
#[derive(Error, Debug)]
pub enum UsageError {
    /// Server unreachable or login rejected
    #[error("{0}")]
    Connection(#[source] TransportError),

    /// Neither quota lookup nor manual computation produced a figure
    #[error("Mailbox usage unavailable: {quota}; {manual}")]
    UsageUnavailable {
        quota: QuotaParseFailure,
        #[source]
        manual: ManualComputationError,
    },

    /// Lookup task ended without producing a result
    #[error("Usage lookup aborted: {0}")]
    Aborted(String),

    /// Request lacks user, password or host
    #[error("Missing required fields")]
    MissingFields,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

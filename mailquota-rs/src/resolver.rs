//! Mailbox usage resolution
//!
//! One resolution owns one session:
//!
//! 1. connect (single attempt)
//! 2. GETQUOTAROOT and normalize the answer
//! 3. if that fails for any reason, sum message sizes instead
//! 4. disconnect, exactly once, whatever happened in 2 and 3
//!
//! [`UsageResolver::resolve_detached`] runs these steps on their own task, so
//! the disconnect still happens when the caller stops waiting.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{QuotaParseFailure, Result, UsageError};
use crate::manual::{compute_mailbox_size, ManualSizeReport};
use crate::quota::{parse_quota, QuotaReport};
use crate::transport::{ConnectionParameters, MailSession, MailTransport};

/// Mailbox whose quota root and size are reported
pub const DEFAULT_MAILBOX: &str = "INBOX";

/// Usage figure obtained for one account
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum UsageResult {
    /// Server-reported storage quota
    Quota(QuotaReport),
    /// Computed from message sizes; no limit known
    Manual(ManualSizeReport),
}

/// Resolves mailbox usage through a transport
pub struct UsageResolver<T> {
    transport: T,
    mailbox: String,
}

impl<T: MailTransport> UsageResolver<T> {
    /// Resolver reporting on INBOX
    pub fn new(transport: T) -> Self {
        Self::with_mailbox(transport, DEFAULT_MAILBOX)
    }

    /// Resolver reporting on another mailbox
    pub fn with_mailbox(transport: T, mailbox: impl Into<String>) -> Self {
        Self {
            transport,
            mailbox: mailbox.into(),
        }
    }

    /// Mailbox this resolver reports on
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// Resolve usage for one account
    pub async fn resolve(&self, params: &ConnectionParameters) -> Result<UsageResult> {
        let mut session = self
            .transport
            .connect(params)
            .await
            .map_err(UsageError::Connection)?;

        debug!(imap_host = %params.host, imap_user = %params.user, "Connected");

        let outcome = self.resolve_connected(&mut session).await;

        if let Err(e) = session.disconnect().await {
            warn!(imap_host = %params.host, "Failed to disconnect cleanly: {}", e);
        }

        outcome
    }

    /// Resolve usage on a spawned task. Dropping the returned future does not
    /// cancel the lookup; the session is still logged out.
    pub async fn resolve_detached(self: Arc<Self>, params: ConnectionParameters) -> Result<UsageResult>
    where
        T: 'static,
    {
        match tokio::spawn(async move { self.resolve(&params).await }).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(UsageError::Aborted(e.to_string())),
        }
    }

    async fn resolve_connected(&self, session: &mut T::Session) -> Result<UsageResult> {
        let quota = match self.try_quota(session).await {
            Ok(report) => return Ok(UsageResult::Quota(report)),
            Err(failure) => failure,
        };

        info!("Quota not available ({}), calculating manually", quota);

        compute_mailbox_size(session, &self.mailbox)
            .await
            .map(UsageResult::Manual)
            .map_err(|manual| UsageError::UsageUnavailable { quota, manual })
    }

    async fn try_quota(
        &self,
        session: &mut T::Session,
    ) -> std::result::Result<QuotaReport, QuotaParseFailure> {
        let response = session
            .get_quota_root(&self.mailbox)
            .await
            .map_err(QuotaParseFailure::Query)?;

        debug!("Quota response structure: {}", response);
        parse_quota(&response)
    }
}

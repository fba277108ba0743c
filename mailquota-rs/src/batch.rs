//! Usage lookups for several accounts
//!
//! Accounts are resolved independently: an invalid or failing account is
//! recorded and the batch carries on. Results keep request order.

use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, UsageError};
use crate::resolver::{UsageResolver, UsageResult};
use crate::transport::{ConnectionParameters, MailTransport, DEFAULT_IMAP_PORT};

/// Account as received from a caller; every field may be missing
#[derive(Debug, Clone, Default)]
pub struct AccountRequest {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<bool>,
}

impl AccountRequest {
    /// Read an account from a JSON body. Fields of the wrong type count as missing.
    pub fn from_json(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        let port = value
            .get("port")
            .and_then(|port| port.as_u64().or_else(|| port.as_str()?.trim().parse().ok()))
            .and_then(|port| u16::try_from(port).ok());

        Self {
            user: text("user"),
            password: text("password"),
            host: text("host"),
            port,
            tls: value.get("tls").and_then(Value::as_bool),
        }
    }

    /// Identifier used to key batch results
    pub fn account_id(&self) -> String {
        present(&self.user).unwrap_or("unknown").to_string()
    }

    /// Validate into connection parameters. Empty strings count as missing.
    pub fn into_params(self) -> Result<ConnectionParameters> {
        let (Some(user), Some(password), Some(host)) = (
            present(&self.user),
            present(&self.password),
            present(&self.host),
        ) else {
            return Err(UsageError::MissingFields);
        };

        Ok(ConnectionParameters {
            host: host.to_string(),
            port: self.port.unwrap_or(DEFAULT_IMAP_PORT),
            user: user.to_string(),
            password: password.to_string(),
            tls: self.tls.unwrap_or(true),
        })
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

/// Outcome for one account of a batch
#[derive(Debug)]
pub struct BatchEntry {
    /// Account identifier (user name, or "unknown")
    pub account: String,
    /// Usage, or the error message for this account
    pub result: std::result::Result<UsageResult, String>,
}

/// Resolve every account with at most `concurrency` connections open at once
pub async fn resolve_batch<T: MailTransport + 'static>(
    resolver: Arc<UsageResolver<T>>,
    accounts: Vec<AccountRequest>,
    concurrency: usize,
) -> Vec<BatchEntry> {
    info!(
        "Resolving usage for {} accounts (concurrency {})",
        accounts.len(),
        concurrency
    );

    futures::stream::iter(accounts)
        .map(move |account| {
            let resolver = resolver.clone();
            async move { resolve_account(resolver, account).await }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

async fn resolve_account<T: MailTransport + 'static>(
    resolver: Arc<UsageResolver<T>>,
    account: AccountRequest,
) -> BatchEntry {
    let account_id = account.account_id();

    let result = match account.into_params() {
        Ok(params) => resolver.resolve_detached(params).await,
        Err(e) => Err(e),
    };

    if let Err(ref e) = result {
        warn!(account = %account_id, "Usage lookup failed: {}", e);
    }

    BatchEntry {
        account: account_id,
        result: result.map_err(|e| e.to_string()),
    }
}

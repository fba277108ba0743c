//! Scripted transport for testing
//!
//! Each call is answered from a fixed script and counted, so tests can
//! assert on exactly which IMAP primitives a resolution used.

use futures::StreamExt;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{
    ConnectionParameters, MailSession, MailTransport, MailboxStatus, MessageSize, RawQuotaResponse,
    SizeStream,
};
use crate::error::TransportError;

/// Call counters shared by a mock transport and all of its sessions
#[derive(Debug, Default)]
pub struct MockStats {
    connects: AtomicUsize,
    quota_queries: AtomicUsize,
    mailbox_opens: AtomicUsize,
    fetches: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn quota_queries(&self) -> usize {
        self.quota_queries.load(Ordering::SeqCst)
    }

    pub fn mailbox_opens(&self) -> usize {
        self.mailbox_opens.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
struct Script {
    quota: Result<Value, String>,
    quota_delay: Option<Duration>,
    mailbox: Result<(), String>,
    sizes: Vec<u64>,
    fail_fetch_after: Option<usize>,
    fail_disconnect: bool,
}

/// Mock transport answering from a script
#[derive(Debug, Clone)]
pub struct MockTransport {
    script: Script,
    refused_hosts: HashSet<String>,
    stats: Arc<MockStats>,
}

impl MockTransport {
    /// Server without QUOTA support and an empty INBOX
    pub fn new() -> Self {
        Self {
            script: Script {
                quota: Err("BAD Unknown command GETQUOTAROOT".to_string()),
                quota_delay: None,
                mailbox: Ok(()),
                sizes: Vec::new(),
                fail_fetch_after: None,
                fail_disconnect: false,
            },
            refused_hosts: HashSet::new(),
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Answer GETQUOTAROOT with this response
    pub fn with_quota(mut self, response: Value) -> Self {
        self.script.quota = Ok(response);
        self
    }

    /// Fail GETQUOTAROOT with this message
    pub fn with_quota_error(mut self, message: &str) -> Self {
        self.script.quota = Err(message.to_string());
        self
    }

    /// Answer GETQUOTAROOT only after `delay`
    pub fn with_quota_delay(mut self, delay: Duration) -> Self {
        self.script.quota_delay = Some(delay);
        self
    }

    /// Messages in the mailbox, delivered by fetch in this order
    pub fn with_messages(mut self, sizes: Vec<u64>) -> Self {
        self.script.sizes = sizes;
        self
    }

    /// Fail opening the mailbox
    pub fn with_mailbox_error(mut self, message: &str) -> Self {
        self.script.mailbox = Err(message.to_string());
        self
    }

    /// Fail the fetch stream after `delivered` messages
    pub fn with_fetch_error_after(mut self, delivered: usize) -> Self {
        self.script.fail_fetch_after = Some(delivered);
        self
    }

    /// Fail LOGOUT
    pub fn with_disconnect_error(mut self) -> Self {
        self.script.fail_disconnect = true;
        self
    }

    /// Refuse connections to this host
    pub fn refuse_host(mut self, host: &str) -> Self {
        self.refused_hosts.insert(host.to_string());
        self
    }

    /// Counters for every session opened by this transport
    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MailTransport for MockTransport {
    type Session = MockSession;

    async fn connect(&self, params: &ConnectionParameters) -> Result<MockSession, TransportError> {
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        debug!("MockTransport: connect to {}:{}", params.host, params.port);

        if self.refused_hosts.contains(&params.host) {
            return Err(TransportError::Protocol(format!(
                "connection to {} refused",
                params.host
            )));
        }

        Ok(MockSession {
            script: self.script.clone(),
            stats: self.stats.clone(),
            open: true,
        })
    }
}

/// Session handed out by [`MockTransport`]
#[derive(Debug)]
pub struct MockSession {
    script: Script,
    stats: Arc<MockStats>,
    open: bool,
}

impl MockSession {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

#[async_trait::async_trait]
impl MailSession for MockSession {
    async fn get_quota_root(&mut self, _mailbox: &str) -> Result<RawQuotaResponse, TransportError> {
        self.ensure_open()?;
        if let Some(delay) = self.script.quota_delay {
            tokio::time::sleep(delay).await;
        }
        self.stats.quota_queries.fetch_add(1, Ordering::SeqCst);
        self.script.quota.clone().map_err(TransportError::Protocol)
    }

    async fn open_mailbox(&mut self, name: &str, read_only: bool) -> Result<MailboxStatus, TransportError> {
        self.ensure_open()?;
        self.stats.mailbox_opens.fetch_add(1, Ordering::SeqCst);
        debug!("MockSession: open {} (read_only: {})", name, read_only);

        self.script
            .mailbox
            .clone()
            .map_err(TransportError::Protocol)?;

        Ok(MailboxStatus {
            message_count: self.script.sizes.len() as u32,
        })
    }

    async fn fetch_sizes<'a>(&'a mut self, range: &str) -> Result<SizeStream<'a>, TransportError> {
        self.ensure_open()?;
        self.stats.fetches.fetch_add(1, Ordering::SeqCst);
        debug!("MockSession: fetch {} RFC822.SIZE", range);

        let fail_after = self.script.fail_fetch_after;
        let items: Vec<Result<MessageSize, TransportError>> = self
            .script
            .sizes
            .iter()
            .enumerate()
            .map(|(index, size)| {
                if fail_after.is_some_and(|n| index >= n) {
                    Err(TransportError::Protocol("connection reset during FETCH".to_string()))
                } else {
                    Ok(MessageSize {
                        sequence: index as u32 + 1,
                        size_bytes: *size,
                    })
                }
            })
            .collect();

        Ok(futures::stream::iter(items).boxed())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.open = false;

        if self.script.fail_disconnect {
            return Err(TransportError::Protocol("LOGOUT failed".to_string()));
        }
        Ok(())
    }
}

//! IMAP transport backed by async-imap

use async_imap::types::{Fetch, Quota, QuotaResourceName};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use super::{
    ConnectionParameters, MailSession, MailTransport, MailboxStatus, MessageSize, RawQuotaResponse,
    SizeStream,
};
use crate::error::TransportError;

/// Byte stream an IMAP client can run over (plain TCP or TLS)
trait ImapIo: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T> ImapIo for T where T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

type ImapStream = Box<dyn ImapIo>;

/// Connects to real IMAP servers
#[derive(Debug, Clone)]
pub struct ImapTransport {
    /// Upper bound for TCP connect, TLS handshake, greeting and login
    connect_timeout: Duration,
}

impl ImapTransport {
    /// Create a transport with the given connect timeout
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn establish(&self, params: &ConnectionParameters) -> Result<ImapSession, TransportError> {
        let tcp_stream = TcpStream::connect((params.host.as_str(), params.port)).await?;

        let stream: ImapStream = if params.tls {
            let server_name = rustls::ServerName::try_from(params.host.as_str())
                .map_err(|_| TransportError::Tls(format!("invalid DNS name: {}", params.host)))?;
            let tls_stream = tls_connector()?.connect(server_name, tcp_stream).await?;
            Box::new(tls_stream)
        } else {
            Box::new(tcp_stream)
        };

        let mut client = async_imap::Client::new(stream);
        client
            .read_response()
            .await
            .ok_or_else(|| TransportError::Protocol("server sent no greeting".to_string()))??;

        let session = client
            .login(&params.user, &params.password)
            .await
            .map_err(|(err, _client)| err)?;

        Ok(ImapSession {
            session: Some(session),
        })
    }
}

#[async_trait::async_trait]
impl MailTransport for ImapTransport {
    type Session = ImapSession;

    async fn connect(&self, params: &ConnectionParameters) -> Result<ImapSession, TransportError> {
        debug!(
            imap_host = %params.host,
            imap_port = params.port,
            imap_tls = params.tls,
            imap_user = %params.user,
            "connecting to an IMAP server"
        );

        tokio::time::timeout(self.connect_timeout, self.establish(params))
            .await
            .map_err(|_| TransportError::Timeout {
                host: params.host.clone(),
                after: self.connect_timeout,
            })?
    }
}

/// Build a rustls connector trusting the platform root certificates
fn tls_connector() -> Result<TlsConnector, TransportError> {
    let certs = rustls_native_certs::load_native_certs()?;
    let der: Vec<Vec<u8>> = certs.into_iter().map(|cert| cert.0).collect();

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(&der);
    debug!("Loaded {} native root certificates ({} ignored)", added, ignored);

    if roots.is_empty() {
        return Err(TransportError::Tls("no usable root certificates".to_string()));
    }

    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Authenticated async-imap session
pub struct ImapSession {
    session: Option<async_imap::Session<ImapStream>>,
}

impl ImapSession {
    fn live(&mut self) -> Result<&mut async_imap::Session<ImapStream>, TransportError> {
        self.session.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait::async_trait]
impl MailSession for ImapSession {
    async fn get_quota_root(&mut self, mailbox: &str) -> Result<RawQuotaResponse, TransportError> {
        let (roots, quotas) = self.live()?.get_quota_root(mailbox).await?;
        debug!(mailbox, roots = roots.len(), quotas = quotas.len(), "GETQUOTAROOT answered");
        Ok(render_quotas(&quotas))
    }

    async fn open_mailbox(&mut self, name: &str, read_only: bool) -> Result<MailboxStatus, TransportError> {
        let session = self.live()?;
        let mailbox = if read_only {
            session.examine(name).await?
        } else {
            session.select(name).await?
        };

        Ok(MailboxStatus {
            message_count: mailbox.exists,
        })
    }

    async fn fetch_sizes<'a>(&'a mut self, range: &str) -> Result<SizeStream<'a>, TransportError> {
        let fetches = self.live()?.fetch(range.to_string(), "RFC822.SIZE").await?;

        let sizes = fetches.map(
            |item: Result<Fetch, async_imap::error::Error>| -> Result<MessageSize, TransportError> {
                let fetch = item?;
                let size = fetch.size.ok_or_else(|| {
                    TransportError::Protocol(format!("no RFC822.SIZE for message {}", fetch.message))
                })?;
                Ok(MessageSize {
                    sequence: fetch.message,
                    size_bytes: u64::from(size),
                })
            },
        );

        Ok(sizes.boxed())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if let Some(mut session) = self.session.take() {
            session.logout().await?;
        }
        Ok(())
    }
}

/// Render typed QUOTA responses as a list of quota roots:
/// `[{"root": "", "quota": {"STORAGE": [used, limit]}}]`
fn render_quotas(quotas: &[Quota]) -> RawQuotaResponse {
    let roots = quotas
        .iter()
        .map(|quota| {
            let resources = quota.resources.iter().filter_map(|resource| match resource.name {
                QuotaResourceName::Storage => Some(("STORAGE", resource.usage, resource.limit)),
                _ => None,
            });
            quota_root(&quota.root_name, resources)
        })
        .collect();

    Value::Array(roots)
}

fn quota_root<'a>(root: &str, resources: impl Iterator<Item = (&'a str, u64, u64)>) -> Value {
    let mut quota = Map::new();
    for (name, usage, limit) in resources {
        quota.insert(name.to_string(), json!([usage, limit]));
    }
    json!({ "root": root, "quota": quota })
}

//! mailquota-rs: IMAP mailbox usage API server

use mailquota_rs::api::UsageServer;
use mailquota_rs::transport::imap::ImapTransport;
use mailquota_rs::ServiceConfig;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailquota_rs=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting mailquota-rs v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if let Some(config_path) = std::env::args().nth(1) {
        info!("Loading configuration from {}", config_path);
        ServiceConfig::from_file(Path::new(&config_path))?
    } else {
        info!("No config file specified, using development defaults");
        ServiceConfig::development()
    };
    config.apply_env()?;
    config.validate()?;

    match config.account {
        Some(ref account) => info!("Default account: {}@{}:{}", account.user, account.host, account.port),
        None => {
            warn!("Default IMAP account not set");
            warn!("Set IMAP_USER, IMAP_PASSWORD and IMAP_HOST or use the POST endpoints with credentials");
        }
    }

    let transport = ImapTransport::new(config.imap.connect_timeout());
    let server = UsageServer::new(&config, transport);
    server.run().await?;

    Ok(())
}

//! API Server - HTTP server for the usage endpoints

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::{self, AppState, AVAILABLE_ENDPOINTS};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::resolver::UsageResolver;
use crate::transport::MailTransport;

/// Build the router for the given state
pub fn router<T: MailTransport + 'static>(state: Arc<AppState<T>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/mailbox",
            get(handlers::get_mailbox::<T>).post(handlers::post_mailbox::<T>),
        )
        .route("/mailbox/batch", post(handlers::post_batch::<T>))
        .fallback(handlers::not_found)
        .layer(CatchPanicLayer::custom(handlers::handle_panic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Usage API server
pub struct UsageServer<T> {
    state: Arc<AppState<T>>,
    addr: String,
}

impl<T: MailTransport + 'static> UsageServer<T> {
    /// Create a server resolving accounts through `transport`
    pub fn new(config: &ServiceConfig, transport: T) -> Self {
        let resolver = UsageResolver::with_mailbox(transport, config.imap.mailbox.clone());

        let state = Arc::new(AppState {
            resolver: Arc::new(resolver),
            default_account: config.account.as_ref().map(|account| account.params()),
            batch_concurrency: config.batch.concurrency,
        });

        Self {
            state,
            addr: config.server.listen_addr.clone(),
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Start the API server
    pub async fn run(&self) -> Result<()> {
        let router = self.router();
        let listener = TcpListener::bind(&self.addr).await?;
        let local_addr = listener.local_addr()?;

        info!("Mailbox usage API listening on {}", local_addr);
        info!("Available endpoints:");
        for endpoint in AVAILABLE_ENDPOINTS {
            info!("  {}", endpoint);
        }

        axum::serve(listener, router).await?;

        Ok(())
    }
}

//! Upload-and-download web front end.
//!
//! A browser submits a file, a password and an action; the server runs the
//! operation, stores the result under a per-request token in the configured
//! output directory and sends back a page that starts the download. Uploads
//! are processed in memory and never written to disk. Stored results are
//! deleted once they are older than the retention period.

mod handlers;
mod page;
mod store;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::{ErrorCategory, ErrorKind, ImagecryptError, Result};

pub use handlers::ApiError;
pub use page::download_url;
pub use store::{OutputStore, StoredOutput, TOKEN_LEN};

/// Default cap on a `/process` request body.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Default time a stored result stays downloadable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

/// Default period of the expired-output sweep.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Server settings, passed in explicitly rather than read from globals.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub bind: SocketAddr,
    pub output_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub retention: Duration,
    pub cleanup_interval: Duration,
}

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub store: OutputStore,
}

impl AppState {
    pub fn new(store: OutputStore) -> Self {
        Self { store }
    }
}

/// Build the router. Split from [`serve`] so tests can drive it directly.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/process", post(handlers::process))
        .route("/download/:token/:name", get(handlers::download))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until Ctrl-C.
pub async fn serve(config: WebConfig) -> Result<()> {
    let store = OutputStore::new(&config.output_dir)?;
    spawn_cleanup(store.clone(), config.retention, config.cleanup_interval);
    let app = router(AppState::new(store), config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| {
            ImagecryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Io,
                format!("failed to bind {}", config.bind),
                e,
            )
        })?;

    info!(
        bind = %config.bind,
        output_dir = %config.output_dir.display(),
        max_upload_bytes = config.max_upload_bytes,
        retention_secs = config.retention.as_secs(),
        "imagecrypt web server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            ImagecryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "server error",
                e,
            )
        })?;

    info!("imagecrypt web server stopped");
    Ok(())
}

/// Periodically delete stored outputs older than `retention`.
fn spawn_cleanup(store: OutputStore, retention: Duration, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.remove_expired(retention)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(removed)) => debug!(removed, "removed expired outputs"),
                Ok(Err(e)) => warn!(error = %e, "output cleanup failed"),
                Err(e) => warn!(error = %e, "output cleanup task failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
}

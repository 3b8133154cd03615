use axum::extract::DefaultBodyLimit;
use axum::Router;
use http::header::AUTHORIZATION;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::sensitive_headers::SetSensitiveRequestHeadersLayer;
use tower_http::trace::TraceLayer;

use crate::ServiceState;

pub mod client;
pub mod health;
pub mod s3;

const STATUS_PREFIX: &str = "/_status";

/// The full HTTP surface: health endpoints plus the S3 API.
pub fn router(state: ServiceState) -> Router {
    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .merge(s3::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new([AUTHORIZATION]))
                .layer(TraceLayer::new_for_http())
                // object bodies are size-checked by the handlers
                .layer(DefaultBodyLimit::disable()),
        )
}

/// Serve until `shutdown` fires, then finish in-flight requests.
pub async fn run(
    listener: TcpListener,
    state: ServiceState,
    mut shutdown: watch::Receiver<()>,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

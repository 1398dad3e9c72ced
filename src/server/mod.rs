use axum::{routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use crate::sampler::Sampler;

pub mod routes;

/// Server state
pub struct AppState {
    pub sampler: Sampler,
}

pub fn router(sampler: Sampler) -> Router {
    let state = Arc::new(AppState { sampler });

    Router::new()
        .route("/", get(routes::random_file))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server(
    addr: SocketAddr,
    sampler: Sampler,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(sampler);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

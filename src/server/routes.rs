use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use crate::server::AppState;

const INTERNAL_ERROR_BODY: &str = "500 Internal Server Error";

type RouteError = (StatusCode, &'static str);

fn internal_error(err: impl std::fmt::Display) -> RouteError {
    tracing::error!("Failed to serve random file: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY)
}

/// Stream one randomly chosen indexed file, unframed.
pub async fn random_file(State(state): State<Arc<AppState>>) -> Result<Response, RouteError> {
    let sampler = state.sampler.clone();
    let (file, path) = tokio::task::spawn_blocking(move || sampler.pick())
        .await
        .map_err(internal_error)?
        .map_err(internal_error)?;

    let blob = tokio::fs::File::open(&path).await.map_err(internal_error)?;
    tracing::debug!("Serving indexed file {} ({})", file.id, file.path);

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(ReaderStream::new(blob)),
    )
        .into_response())
}

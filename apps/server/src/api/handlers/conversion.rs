//! Visit-to-invoice conversion endpoints

use crate::{
    services::conversion::{
        progress::{self, ProgressPublisher},
        ConversionPreview,
    },
    state::AppState,
    Error, Result,
};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Events queued between the run task and a slow client. Small on
/// purpose: the run should feel backpressure rather than buffer progress.
const EVENT_CHANNEL_CAPACITY: usize = 32;

const MAX_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConversionQuery {
    pub chunk_size: Option<usize>,
}

/// Start a conversion run. The connection stays open for the duration of
/// the run and carries newline-delimited JSON progress events; closing it
/// cancels the run at its next checkpoint.
pub async fn run_conversion(
    State(state): State<AppState>,
    Query(q): Query<RunConversionQuery>,
) -> Result<Response> {
    if let Some(chunk_size) = q.chunk_size {
        if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::Validation(format!(
                "chunkSize must be between 1 and {MAX_CHUNK_SIZE}"
            )));
        }
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let publisher = ProgressPublisher::new(tx, cancel.clone());

    let service = state.conversion.clone();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        service.run(publisher, run_cancel, q.chunk_size).await;
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(progress::ndjson_stream(rx, cancel)))
        .map_err(|e| Error::Internal(format!("failed to build streaming response: {e}")))
}

/// Read-only report of how many visits a run would cover.
pub async fn preview_conversion(State(state): State<AppState>) -> Result<Json<ConversionPreview>> {
    let preview = state.conversion.preview().await?;
    Ok(Json(preview))
}

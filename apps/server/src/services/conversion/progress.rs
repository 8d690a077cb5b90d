//! Progress events streamed to the triggering client
//!
//! Events travel through a bounded channel into a newline-delimited JSON
//! response body. The channel doubles as the disconnect signal: when the
//! client goes away axum drops the body stream, the receiver closes, and
//! the run's cancellation token flips.

use axum::body::Bytes;
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One event on the progress stream. Serialized shapes are the wire
/// contract consumed by the clinic frontend's progress bar.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConversionEvent {
    Progress {
        current: u64,
        total: u64,
        created: u64,
        skipped: u64,
        errors: u64,
    },
    Complete {
        success: bool,
        created: u64,
        skipped: u64,
        failed: u64,
        total: u64,
        #[serde(rename = "invoicesCreated")]
        invoices_created: Vec<i64>,
        errors: Vec<VisitError>,
    },
    Cancelled,
    Error {
        error: String,
    },
}

/// A per-visit failure carried in the terminal `complete` event.
#[derive(Debug, Clone, Serialize)]
pub struct VisitError {
    #[serde(rename = "visitId")]
    pub visit_id: i64,
    pub error: String,
}

impl VisitError {
    pub fn new(visit_id: i64, error: impl Into<String>) -> Self {
        Self {
            visit_id,
            error: error.into(),
        }
    }
}

/// Running counters for one conversion run.
///
/// Counters only move through the `record_*` methods, each of which bumps
/// `processed`, so `processed == created + skipped + failed` holds at
/// every point of a run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub total: u64,
    pub processed: u64,
    pub created: u64,
    pub skipped_converted: u64,
    pub skipped_empty: u64,
    pub failed: u64,
}

impl RunStats {
    pub fn new(total: usize) -> Self {
        Self {
            total: total as u64,
            ..Default::default()
        }
    }

    pub fn record_created(&mut self) {
        self.processed += 1;
        self.created += 1;
    }

    /// Visit already has an invoice from an earlier run.
    pub fn record_skipped_converted(&mut self) {
        self.processed += 1;
        self.skipped_converted += 1;
    }

    /// Visit has no billable content.
    pub fn record_skipped_empty(&mut self) {
        self.processed += 1;
        self.skipped_empty += 1;
    }

    pub fn record_failed(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn skipped(&self) -> u64 {
        self.skipped_converted + self.skipped_empty
    }

    pub fn progress_event(&self) -> ConversionEvent {
        ConversionEvent::Progress {
            current: self.processed,
            total: self.total,
            created: self.created,
            skipped: self.skipped(),
            errors: self.failed,
        }
    }

    pub fn complete_event(
        &self,
        invoices_created: Vec<i64>,
        errors: Vec<VisitError>,
    ) -> ConversionEvent {
        ConversionEvent::Complete {
            success: true,
            created: self.created,
            skipped: self.skipped(),
            failed: self.failed,
            total: self.total,
            invoices_created,
            errors,
        }
    }
}

/// Sending half of the progress stream, handed to the run task.
#[derive(Clone)]
pub struct ProgressPublisher {
    tx: mpsc::Sender<ConversionEvent>,
    cancel: CancellationToken,
}

impl ProgressPublisher {
    pub fn new(tx: mpsc::Sender<ConversionEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Deliver one event to the client. Returns false when the receiver
    /// is gone (client disconnected); the cancellation token is flipped
    /// so the run stops at its next checkpoint.
    pub async fn publish(&self, event: ConversionEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            self.cancel.cancel();
            return false;
        }
        true
    }
}

/// Render the event channel as an NDJSON byte stream, one JSON object
/// plus newline per event. Each event becomes its own body frame, so the
/// client sees it as soon as it is produced.
///
/// The embedded guard cancels the run when the stream is dropped - the
/// path taken when the client disconnects mid-run.
pub fn ndjson_stream(
    mut rx: mpsc::Receiver<ConversionEvent>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    let guard = DisconnectGuard { cancel };
    async_stream::stream! {
        let _guard = guard;
        while let Some(event) = rx.recv().await {
            match serde_json::to_vec(&event) {
                Ok(mut line) => {
                    line.push(b'\n');
                    yield Ok(Bytes::from(line));
                }
                Err(e) => tracing::error!(error = %e, "Failed to serialize progress event"),
            }
        }
    }
}

struct DisconnectGuard {
    cancel: CancellationToken,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

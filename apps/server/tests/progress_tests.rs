//! Progress event wire shapes, run counters and disconnect handling

use futures::StreamExt;
use praxis::services::conversion::progress::{
    self, ConversionEvent, ProgressPublisher, RunStats, VisitError,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn to_value(event: &ConversionEvent) -> Value {
    serde_json::to_value(event).unwrap()
}

#[test]
fn progress_event_wire_shape() {
    let event = ConversionEvent::Progress {
        current: 150,
        total: 300,
        created: 120,
        skipped: 25,
        errors: 5,
    };

    assert_eq!(
        to_value(&event),
        json!({
            "type": "progress",
            "current": 150,
            "total": 300,
            "created": 120,
            "skipped": 25,
            "errors": 5,
        })
    );
}

#[test]
fn complete_event_wire_shape() {
    let event = ConversionEvent::Complete {
        success: true,
        created: 2,
        skipped: 1,
        failed: 1,
        total: 4,
        invoices_created: vec![42, 43],
        errors: vec![VisitError::new(7, "lock timeout")],
    };

    assert_eq!(
        to_value(&event),
        json!({
            "type": "complete",
            "success": true,
            "created": 2,
            "skipped": 1,
            "failed": 1,
            "total": 4,
            "invoicesCreated": [42, 43],
            "errors": [{ "visitId": 7, "error": "lock timeout" }],
        })
    );
}

#[test]
fn terminal_event_wire_shapes() {
    assert_eq!(
        to_value(&ConversionEvent::Cancelled),
        json!({ "type": "cancelled" })
    );
    assert_eq!(
        to_value(&ConversionEvent::Error {
            error: "boom".to_string()
        }),
        json!({ "type": "error", "error": "boom" })
    );
}

#[test]
fn run_stats_conserve_counts() {
    let mut stats = RunStats::new(10);

    stats.record_created();
    stats.record_created();
    stats.record_skipped_converted();
    stats.record_skipped_empty();
    stats.record_failed();

    assert_eq!(stats.processed, 5);
    assert_eq!(
        stats.processed,
        stats.created + stats.skipped() + stats.failed
    );
    assert!(stats.processed <= stats.total);

    assert_eq!(
        to_value(&stats.progress_event()),
        json!({
            "type": "progress",
            "current": 5,
            "total": 10,
            "created": 2,
            "skipped": 2,
            "errors": 1,
        })
    );
}

#[tokio::test]
async fn ndjson_stream_emits_one_line_per_event() {
    let (tx, rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();
    let publisher = ProgressPublisher::new(tx, cancel.clone());

    assert!(publisher.publish(ConversionEvent::Cancelled).await);
    drop(publisher);

    let mut stream = Box::pin(progress::ndjson_stream(rx, cancel));

    let line = stream.next().await.unwrap().unwrap();
    assert_eq!(line.as_ref(), b"{\"type\":\"cancelled\"}\n");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn publisher_cancels_run_when_client_is_gone() {
    let (tx, rx) = mpsc::channel(1);
    let cancel = CancellationToken::new();
    let publisher = ProgressPublisher::new(tx, cancel.clone());

    drop(rx);

    assert!(!publisher.publish(ConversionEvent::Cancelled).await);
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_run() {
    let (_tx, rx) = mpsc::channel::<ConversionEvent>(1);
    let cancel = CancellationToken::new();

    let stream = progress::ndjson_stream(rx, cancel.clone());
    assert!(!cancel.is_cancelled());
    drop(stream);

    assert!(cancel.is_cancelled());
}

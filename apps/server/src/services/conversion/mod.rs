//! Visit-to-invoice batch conversion engine
//!
//! Scans historical visits, synthesizes an invoice per visit from its
//! prescriptions (or consultation fee), decrements inventory in chunked
//! aggregates, and streams progress to the triggering client. Runs are
//! idempotent: visits that already have an invoice are skipped, so a
//! partially completed or cancelled run can simply be re-run.

pub mod committer;
pub mod drafter;
pub mod ledger;
pub mod progress;
pub mod sequence;

use crate::{
    config::ConversionConfig,
    db::{InvoiceRepository, ProductRepository, VisitRepository},
    models::VisitRecord,
    Error, Result,
};
use serde::Serialize;
use sqlx::{Connection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use self::committer::BatchCommitter;
use self::progress::{ConversionEvent, ProgressPublisher, RunStats, VisitError};
use self::sequence::InvoiceNumberSequence;
use tokio_util::sync::CancellationToken;

/// Advisory lock key keeping conversion runs single-flight per database.
const CONVERSION_LOCK_KEY: i64 = 0x7072_7863_6e76; // "prxcnv"

/// Read-only report of what a run would cover.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionPreview {
    pub total: u64,
    pub converted: u64,
    pub pending: u64,
}

pub struct ConversionService {
    pool: PgPool,
    settings: ConversionConfig,
}

impl ConversionService {
    pub fn new(pool: PgPool, settings: ConversionConfig) -> Self {
        Self { pool, settings }
    }

    /// How many visits exist, how many already have an invoice, and how
    /// many a run would attempt. No side effects.
    pub async fn preview(&self) -> Result<ConversionPreview> {
        let invoices = InvoiceRepository::new(self.pool.clone());
        let visits = VisitRepository::new(self.pool.clone());

        let converted = ledger::load_converted_visit_ids(&invoices).await?;
        let visit_ids = visits.visit_ids().await?;

        let total = visit_ids.len() as u64;
        let converted_count = visit_ids
            .iter()
            .filter(|id| converted.contains(id))
            .count() as u64;

        Ok(ConversionPreview {
            total,
            converted: converted_count,
            pending: total - converted_count,
        })
    }

    /// Execute one conversion run, publishing progress until a terminal
    /// event. Fatal failures surface as a terminal `error` event rather
    /// than an `Err` - the stream is the only channel back to the client.
    ///
    /// `chunk_size` overrides the configured chunk size for this run.
    pub async fn run(
        &self,
        publisher: ProgressPublisher,
        cancel: CancellationToken,
        chunk_size: Option<usize>,
    ) {
        let run_id = Uuid::new_v4();
        let chunk_size = chunk_size.unwrap_or(self.settings.chunk_size).max(1);
        tracing::info!(run_id = %run_id, chunk_size, "Starting visit-to-invoice conversion run");

        let lock = match RunLock::acquire(&self.pool).await {
            Ok(lock) => lock,
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "Conversion run could not start");
                publisher
                    .publish(ConversionEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let result = self.execute(&publisher, &cancel, chunk_size).await;
        lock.release().await;

        if let Err(e) = result {
            tracing::error!(run_id = %run_id, error = %e, "Conversion run failed");
            publisher
                .publish(ConversionEvent::Error {
                    error: e.to_string(),
                })
                .await;
        }
    }

    async fn execute(
        &self,
        publisher: &ProgressPublisher,
        cancel: &CancellationToken,
        chunk_size: usize,
    ) -> Result<()> {
        let invoices = InvoiceRepository::new(self.pool.clone());
        let visit_repo = VisitRepository::new(self.pool.clone());
        let products = ProductRepository::new(self.pool.clone());

        let converted = ledger::load_converted_visit_ids(&invoices).await?;
        let visits = visit_repo.load_billable_visits().await?;
        let catalog = products.load_catalog().await?;
        let mut sequence = InvoiceNumberSequence::new(invoices.max_invoice_no().await?);

        let snapshot = catalog
            .values()
            .map(|product| (product.id, product.quantity_on_hand))
            .collect();
        let mut committer = BatchCommitter::new(self.pool.clone(), self.settings.clone(), snapshot);

        let mut stats = RunStats::new(visits.len());
        let mut invoice_numbers: Vec<i64> = Vec::new();
        let mut errors: Vec<VisitError> = Vec::new();

        tracing::info!(
            total_visits = visits.len(),
            already_converted = converted.len(),
            chunk_size,
            first_invoice_no = sequence.peek(),
            "Conversion scope computed"
        );

        publisher.publish(stats.progress_event()).await;

        for chunk in visits.chunks(chunk_size) {
            // Checkpoint: before starting a chunk.
            if cancel.is_cancelled() {
                return finish_cancelled(publisher, &stats).await;
            }

            let pending_ids: Vec<i64> = chunk
                .iter()
                .filter(|visit| !converted.contains(&visit.id))
                .map(|visit| visit.id)
                .collect();
            let mut prescriptions = if pending_ids.is_empty() {
                HashMap::new()
            } else {
                visit_repo.load_prescriptions(&pending_ids).await?
            };

            let mut drafts = Vec::new();
            for visit in chunk {
                if converted.contains(&visit.id) {
                    stats.record_skipped_converted();
                    continue;
                }

                let record = VisitRecord {
                    visit: visit.clone(),
                    prescriptions: prescriptions.remove(&visit.id).unwrap_or_default(),
                };

                match drafter::draft_invoice(&record, &catalog, &mut sequence) {
                    Some(draft) => drafts.push(draft),
                    None => stats.record_skipped_empty(),
                }
            }

            // Remaining checkpoints live inside the committer: before
            // each per-invoice commit and before the aggregate update.
            let outcome = committer.commit_chunk(&drafts, cancel).await;

            for invoice in &outcome.committed {
                stats.record_created();
                invoice_numbers.push(invoice.invoice_no);
            }
            for failure in outcome.failures {
                stats.record_failed();
                errors.push(failure);
            }

            if outcome.cancelled {
                return finish_cancelled(publisher, &stats).await;
            }

            publisher.publish(stats.progress_event()).await;

            // Checkpoint: after the chunk.
            if cancel.is_cancelled() {
                return finish_cancelled(publisher, &stats).await;
            }
        }

        tracing::info!(
            created = stats.created,
            skipped = stats.skipped(),
            failed = stats.failed,
            "Conversion run complete"
        );
        publisher
            .publish(stats.complete_event(invoice_numbers, errors))
            .await;

        Ok(())
    }
}

async fn finish_cancelled(publisher: &ProgressPublisher, stats: &RunStats) -> Result<()> {
    // Durably committed work stays in place; the next run skips it via
    // the ledger.
    tracing::warn!(
        processed = stats.processed,
        created = stats.created,
        "Conversion run cancelled by client"
    );
    publisher.publish(ConversionEvent::Cancelled).await;
    Ok(())
}

/// Session-scoped advisory lock held for the duration of one run.
///
/// The connection is detached from the pool: dropping it closes the
/// session outright, which releases the lock even on an early-return
/// path that never reaches `release`.
struct RunLock {
    conn: sqlx::postgres::PgConnection,
}

impl RunLock {
    async fn acquire(pool: &PgPool) -> Result<Self> {
        let mut conn = pool.acquire().await?.detach();

        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(CONVERSION_LOCK_KEY)
            .fetch_one(&mut conn)
            .await?;

        if !locked {
            let _ = conn.close().await;
            return Err(Error::ConversionInProgress);
        }

        Ok(Self { conn })
    }

    async fn release(mut self) {
        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(CONVERSION_LOCK_KEY)
            .execute(&mut self.conn)
            .await
        {
            tracing::warn!(error = %e, "Failed to release conversion advisory lock");
        }
        let _ = self.conn.close().await;
    }
}

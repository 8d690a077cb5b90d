//! Batch committer
//!
//! Persists one chunk of invoice drafts. Two write strategies:
//!
//! - Incremental (default): one bounded transaction per invoice, then a
//!   single bounded transaction applying the chunk's aggregated inventory
//!   deltas. One row update per distinct product per chunk keeps lock
//!   acquisitions at O(products) instead of O(invoices); the price is
//!   that an aggregate failure leaves inventory trailing the invoices
//!   until the next correction.
//! - Atomic (`conversion.atomic_chunks = true`): the whole chunk,
//!   inventory included, in one transaction. All-or-nothing, higher lock
//!   pressure.
//!
//! Product quantities are tracked in an in-process snapshot seeded from
//! the catalog at run start; stock movement balances are computed from it
//! rather than re-reading products per line.

use crate::{
    config::ConversionConfig,
    db::{InvoiceRepository, ProductRepository},
    models::StockDirection,
    Result,
};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use tokio_util::sync::CancellationToken;

use super::{drafter::InvoiceDraft, progress::VisitError};

/// On-hand balance after an outbound movement, floored at zero.
pub fn next_balance(on_hand: i32, quantity: i32) -> i32 {
    (on_hand - quantity).max(0)
}

#[derive(Debug, Clone)]
pub struct CommittedInvoice {
    pub visit_id: i64,
    pub invoice_id: i64,
    pub invoice_no: i64,
}

/// What happened to one chunk. `cancelled` means the run was asked to
/// stop at a checkpoint inside the chunk; everything in `committed` is
/// durable regardless.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    pub committed: Vec<CommittedInvoice>,
    pub failures: Vec<VisitError>,
    pub cancelled: bool,
}

pub struct BatchCommitter {
    pool: PgPool,
    config: ConversionConfig,
    /// Last-known on-hand quantity per product, updated as drafts commit.
    quantities: HashMap<i64, i32>,
}

impl BatchCommitter {
    pub fn new(pool: PgPool, config: ConversionConfig, quantities: HashMap<i64, i32>) -> Self {
        Self {
            pool,
            config,
            quantities,
        }
    }

    pub async fn commit_chunk(
        &mut self,
        drafts: &[InvoiceDraft],
        cancel: &CancellationToken,
    ) -> ChunkOutcome {
        if self.config.atomic_chunks {
            self.commit_chunk_atomic(drafts, cancel).await
        } else {
            self.commit_chunk_incremental(drafts, cancel).await
        }
    }

    /// Default strategy: per-invoice transactions, then one aggregate
    /// inventory transaction. A failed invoice is recorded against its
    /// visit and never aborts the rest of the chunk.
    async fn commit_chunk_incremental(
        &mut self,
        drafts: &[InvoiceDraft],
        cancel: &CancellationToken,
    ) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        let mut chunk_totals: BTreeMap<i64, i32> = BTreeMap::new();

        for draft in drafts {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return outcome;
            }

            match self.commit_invoice(draft).await {
                Ok(invoice_id) => {
                    for (product_id, quantity) in &draft.consumption {
                        *chunk_totals.entry(*product_id).or_insert(0) += quantity;
                        let on_hand = self.quantities.entry(*product_id).or_insert(0);
                        *on_hand = next_balance(*on_hand, *quantity);
                    }
                    outcome.committed.push(CommittedInvoice {
                        visit_id: draft.source_visit_id,
                        invoice_id,
                        invoice_no: draft.invoice_no,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        visit_id = draft.source_visit_id,
                        invoice_no = draft.invoice_no,
                        error = %e,
                        "Invoice commit failed, continuing with next draft"
                    );
                    outcome
                        .failures
                        .push(VisitError::new(draft.source_visit_id, e.to_string()));
                }
            }
        }

        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        if !chunk_totals.is_empty() {
            if let Err(e) = self.apply_inventory(&chunk_totals).await {
                // The chunk's invoices stay committed; inventory catches
                // up on the next external correction.
                tracing::error!(
                    products = chunk_totals.len(),
                    error = %e,
                    "Aggregate inventory update failed for chunk"
                );
            }
        }

        outcome
    }

    /// Alternative strategy: the whole chunk in one transaction. Any
    /// failure rolls back every invoice in the chunk.
    async fn commit_chunk_atomic(
        &mut self,
        drafts: &[InvoiceDraft],
        cancel: &CancellationToken,
    ) -> ChunkOutcome {
        let mut outcome = ChunkOutcome::default();
        if drafts.is_empty() {
            return outcome;
        }
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            return outcome;
        }

        let mut working = self.quantities.clone();
        let mut chunk_totals: BTreeMap<i64, i32> = BTreeMap::new();
        let mut committed = Vec::new();

        let result: Result<()> = async {
            let mut tx = self.pool.begin().await?;
            set_tx_timeouts(
                &mut tx,
                self.config.chunk_lock_timeout_seconds,
                self.config.chunk_statement_timeout_seconds,
            )
            .await?;

            for draft in drafts {
                let invoice_id = write_invoice(&mut tx, draft, &working).await?;
                for (product_id, quantity) in &draft.consumption {
                    *chunk_totals.entry(*product_id).or_insert(0) += quantity;
                    let on_hand = working.entry(*product_id).or_insert(0);
                    *on_hand = next_balance(*on_hand, *quantity);
                }
                committed.push(CommittedInvoice {
                    visit_id: draft.source_visit_id,
                    invoice_id,
                    invoice_no: draft.invoice_no,
                });
            }

            for (product_id, quantity) in &chunk_totals {
                ProductRepository::apply_consumption(&mut tx, *product_id, *quantity).await?;
            }

            tx.commit().await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.quantities = working;
                outcome.committed = committed;
            }
            Err(e) => {
                tracing::error!(
                    visits = drafts.len(),
                    error = %e,
                    "Atomic chunk transaction failed, rolling back entire chunk"
                );
                outcome.failures = drafts
                    .iter()
                    .map(|draft| {
                        VisitError::new(
                            draft.source_visit_id,
                            format!("chunk transaction failed: {e}"),
                        )
                    })
                    .collect();
            }
        }

        outcome
    }

    async fn commit_invoice(&self, draft: &InvoiceDraft) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        set_tx_timeouts(
            &mut tx,
            self.config.invoice_lock_timeout_seconds,
            self.config.invoice_statement_timeout_seconds,
        )
        .await?;

        let invoice_id = write_invoice(&mut tx, draft, &self.quantities).await?;

        tx.commit().await?;
        Ok(invoice_id)
    }

    /// Apply the chunk's aggregated consumption, one update per product.
    /// Products are visited in id order so concurrent chunks of a future
    /// multi-run deployment would acquire row locks in the same order.
    async fn apply_inventory(&self, totals: &BTreeMap<i64, i32>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        set_tx_timeouts(
            &mut tx,
            self.config.chunk_lock_timeout_seconds,
            self.config.chunk_statement_timeout_seconds,
        )
        .await?;

        for (product_id, quantity) in totals {
            ProductRepository::apply_consumption(&mut tx, *product_id, *quantity).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Insert one draft's invoice, line items and stock movements inside the
/// given transaction. Movement balances come from `quantities`, with
/// repeated products within the draft depleting it cumulatively.
async fn write_invoice(
    tx: &mut Transaction<'_, Postgres>,
    draft: &InvoiceDraft,
    quantities: &HashMap<i64, i32>,
) -> Result<i64> {
    let invoice_id = InvoiceRepository::insert_invoice(tx, draft).await?;

    for line in &draft.lines {
        InvoiceRepository::insert_line_item(tx, invoice_id, line).await?;
    }

    let mut consumed_here: HashMap<i64, i32> = HashMap::new();
    for line in &draft.lines {
        let Some(product_id) = line.product_id else {
            continue;
        };

        let on_hand = quantities.get(&product_id).copied().unwrap_or(0);
        let already = consumed_here.get(&product_id).copied().unwrap_or(0);
        let balance_after = next_balance(next_balance(on_hand, already), line.quantity);

        InvoiceRepository::insert_stock_movement(
            tx,
            product_id,
            StockDirection::Outbound,
            line.quantity,
            line.unit_price,
            balance_after,
            invoice_id,
        )
        .await?;

        *consumed_here.entry(product_id).or_insert(0) += line.quantity;
    }

    Ok(invoice_id)
}

async fn set_tx_timeouts(
    tx: &mut Transaction<'_, Postgres>,
    lock_seconds: u64,
    statement_seconds: u64,
) -> Result<()> {
    // SET LOCAL scopes both bounds to this transaction; a stalled write
    // surfaces as a transaction failure instead of stalling the run.
    sqlx::query(&format!("SET LOCAL lock_timeout = '{lock_seconds}s'"))
        .execute(&mut **tx)
        .await?;
    sqlx::query(&format!(
        "SET LOCAL statement_timeout = '{statement_seconds}s'"
    ))
    .execute(&mut **tx)
    .await?;

    Ok(())
}

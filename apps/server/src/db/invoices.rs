//! Invoice repository - ledger queries plus transaction-scoped inserts
//!
//! The insert helpers take an open transaction instead of the pool so the
//! committer controls the transaction boundary (one per invoice, or one
//! per chunk in atomic mode).

use crate::{
    models::StockDirection,
    services::conversion::drafter::{DraftLine, InvoiceDraft},
    Result,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct InvoiceRepository {
    pool: PgPool,
}

impl InvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Source visit ids recorded in the structured back-reference column.
    pub async fn converted_visit_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT source_visit_id FROM invoices WHERE source_visit_id IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Notes of invoices without a structured back-reference that carry
    /// the textual visit marker (rows predating the column, e.g. data
    /// migrated from the legacy system).
    pub async fn legacy_marker_notes(&self) -> Result<Vec<String>> {
        let notes = sqlx::query_scalar::<_, String>(
            r#"
            SELECT notes FROM invoices
            WHERE source_visit_id IS NULL
              AND notes LIKE '%visit ID: %'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(notes)
    }

    pub async fn max_invoice_no(&self) -> Result<i64> {
        let max = sqlx::query_scalar::<_, i64>("SELECT COALESCE(MAX(invoice_no), 0) FROM invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(max)
    }

    /// Insert the invoice row of a draft, returning the new invoice id.
    pub async fn insert_invoice(
        tx: &mut Transaction<'_, Postgres>,
        draft: &InvoiceDraft,
    ) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO invoices
                (invoice_no, customer_name, customer_phone, customer_address,
                 invoice_date, subtotal, tax, discount, total,
                 paid_amount, balance, status, notes, source_visit_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING id
            "#,
        )
        .bind(draft.invoice_no)
        .bind(&draft.customer_name)
        .bind(&draft.customer_phone)
        .bind(&draft.customer_address)
        .bind(draft.invoice_date)
        .bind(draft.subtotal)
        .bind(draft.tax)
        .bind(draft.discount)
        .bind(draft.total)
        .bind(draft.paid_amount)
        .bind(draft.balance)
        .bind(&draft.status)
        .bind(&draft.notes)
        .bind(draft.source_visit_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }

    pub async fn insert_line_item(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: i64,
        line: &DraftLine,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoice_line_items
                (invoice_id, product_id, description, quantity,
                 unit_price, tax_rate, discount, line_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(invoice_id)
        .bind(line.product_id)
        .bind(&line.description)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(line.tax_rate)
        .bind(line.discount)
        .bind(line.line_total)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn insert_stock_movement(
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        direction: StockDirection,
        quantity: i32,
        unit_price: Decimal,
        balance_after: i32,
        invoice_id: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements
                (product_id, direction, quantity, unit_price, balance_after, invoice_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product_id)
        .bind(direction.as_str())
        .bind(quantity)
        .bind(unit_price)
        .bind(balance_after)
        .bind(invoice_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

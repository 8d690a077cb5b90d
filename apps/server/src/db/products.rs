//! Product repository - catalog reads and inventory writes

use crate::{models::ProductInfo, Result};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;

#[derive(Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Full product catalog keyed by id. Loaded once per run; the engine
    /// works from this snapshot instead of re-reading products per item.
    pub async fn load_catalog(&self) -> Result<HashMap<i64, ProductInfo>> {
        let rows = sqlx::query_as::<_, ProductInfo>(
            "SELECT id, name, unit_price, quantity_on_hand FROM products",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|p| (p.id, p)).collect())
    }

    /// Apply one product's aggregated consumption for a chunk: decrement
    /// on-hand stock (floored at zero) and bump the total-sold counter.
    pub async fn apply_consumption(
        tx: &mut Transaction<'_, Postgres>,
        product_id: i64,
        quantity: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE products
            SET quantity_on_hand = GREATEST(0, quantity_on_hand - $2),
                total_sold = total_sold + $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

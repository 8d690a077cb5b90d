//! Visit repository - read-only access to historical visits

use crate::{
    models::{Prescription, VisitRow},
    Result,
};
use sqlx::PgPool;
use std::collections::HashMap;

#[derive(Clone)]
pub struct VisitRepository {
    pool: PgPool,
}

impl VisitRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All visits in ascending visit-date order, each joined with its
    /// patient record when one is linked. Date order drives invoice
    /// numbering, so the secondary `id` sort keeps runs deterministic.
    pub async fn load_billable_visits(&self) -> Result<Vec<VisitRow>> {
        let rows = sqlx::query_as::<_, VisitRow>(
            r#"
            SELECT v.id, v.patient_id, v.visit_date, v.consultation_fee,
                   v.patient_name, v.patient_phone,
                   p.first_name, p.last_name, p.phone, p.address
            FROM visits v
            LEFT JOIN patients p ON p.id = v.patient_id
            ORDER BY v.visit_date ASC, v.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Prescriptions for one chunk of visits, grouped by visit.
    pub async fn load_prescriptions(
        &self,
        visit_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<Prescription>>> {
        let rows = sqlx::query_as::<_, Prescription>(
            r#"
            SELECT id, visit_id, product_id, quantity, unit_price
            FROM prescriptions
            WHERE visit_id = ANY($1)
            ORDER BY visit_id ASC, id ASC
            "#,
        )
        .bind(visit_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: HashMap<i64, Vec<Prescription>> = HashMap::new();
        for row in rows {
            grouped.entry(row.visit_id).or_default().push(row);
        }

        Ok(grouped)
    }

    pub async fn visit_ids(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>("SELECT id FROM visits ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}

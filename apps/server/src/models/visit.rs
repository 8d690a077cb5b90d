//! Historical visit records
//!
//! Visits are immutable input to the conversion engine: they are created
//! by the clinical CRUD endpoints and only ever read here.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::FromRow;

/// One visit joined with its (optional) patient record.
///
/// The patient columns come from a LEFT JOIN; `patient_name` and
/// `patient_phone` are the contact fields stored on the visit itself,
/// used as a fallback when no patient row is linked.
#[derive(Debug, Clone, FromRow)]
pub struct VisitRow {
    pub id: i64,
    pub patient_id: Option<i64>,
    pub visit_date: NaiveDate,
    pub consultation_fee: Option<Decimal>,
    pub patient_name: Option<String>,
    pub patient_phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// A prescribed product on a visit, to be billed and deducted from stock.
#[derive(Debug, Clone, FromRow)]
pub struct Prescription {
    pub id: i64,
    pub visit_id: i64,
    pub product_id: Option<i64>,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
}

/// A visit together with its prescriptions - the drafting unit.
#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub visit: VisitRow,
    pub prescriptions: Vec<Prescription>,
}

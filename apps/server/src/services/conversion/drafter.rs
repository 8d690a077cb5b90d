//! Invoice drafting
//!
//! Turns one historical visit into an in-memory invoice draft. Drafting
//! is pure: it reads the visit record and the product catalog snapshot
//! and produces no side effects, so a failed commit can simply discard
//! the draft.

use crate::models::{ProductInfo, VisitRecord};
use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;

use super::sequence::InvoiceNumberSequence;

/// Status stamped on every generated invoice: historical visits were
/// settled at the time of the visit, so their invoices are born paid.
pub const PAID_STATUS: &str = "paid";

const CONSULTATION_DESCRIPTION: &str = "Consultation fee";
const FALLBACK_CUSTOMER_NAME: &str = "Walk-in patient";

/// An invoice drafted from one visit, not yet persisted.
#[derive(Debug, Clone)]
pub struct InvoiceDraft {
    pub invoice_no: i64,
    pub source_visit_id: i64,
    pub invoice_date: NaiveDate,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    pub lines: Vec<DraftLine>,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: String,
    pub notes: String,
    /// Total quantity this draft will consume per product, aggregated
    /// across its lines. Feeds the committer's inventory bookkeeping.
    pub consumption: HashMap<i64, i32>,
}

#[derive(Debug, Clone)]
pub struct DraftLine {
    pub product_id: Option<i64>,
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub discount: Decimal,
    pub line_total: Decimal,
}

impl DraftLine {
    fn new(product_id: Option<i64>, description: String, quantity: i32, unit_price: Decimal) -> Self {
        // Historical visits are not retaxed or discounted.
        Self {
            product_id,
            description,
            quantity,
            unit_price,
            tax_rate: Decimal::ZERO,
            discount: Decimal::ZERO,
            line_total: Decimal::from(quantity) * unit_price,
        }
    }
}

/// Draft an invoice for one visit, or `None` when the visit has nothing
/// billable (no priceable prescriptions and no consultation fee).
///
/// An invoice number is only drawn from the sequence once the draft is
/// known to be non-empty, so skipped visits leave no gaps.
pub fn draft_invoice(
    record: &VisitRecord,
    catalog: &HashMap<i64, ProductInfo>,
    numbers: &mut InvoiceNumberSequence,
) -> Option<InvoiceDraft> {
    let visit = &record.visit;

    let mut lines = Vec::new();
    let mut consumption: HashMap<i64, i32> = HashMap::new();

    for prescription in &record.prescriptions {
        if prescription.quantity <= 0 {
            continue;
        }

        let product = prescription.product_id.and_then(|id| catalog.get(&id));
        let Some(unit_price) = prescription
            .unit_price
            .or_else(|| product.map(|p| p.unit_price))
        else {
            // No price on the prescription and no known product: nothing
            // to bill for this line.
            continue;
        };

        let description = product
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Prescribed item".to_string());

        // Stock is only tracked for lines backed by a catalog product.
        let product_id = product.map(|p| p.id);
        if let Some(id) = product_id {
            *consumption.entry(id).or_insert(0) += prescription.quantity;
        }

        lines.push(DraftLine::new(
            product_id,
            description,
            prescription.quantity,
            unit_price.abs(),
        ));
    }

    if lines.is_empty() {
        match visit.consultation_fee {
            Some(fee) if fee > Decimal::ZERO => {
                lines.push(DraftLine::new(
                    None,
                    CONSULTATION_DESCRIPTION.to_string(),
                    1,
                    fee.abs(),
                ));
            }
            _ => return None,
        }
    }

    let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
    // Whole currency units, half away from zero.
    let total = subtotal.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    let notes = format!(
        "Generated from visit ID: {} dated {}",
        visit.id,
        visit.visit_date.format("%Y-%m-%d")
    );

    Some(InvoiceDraft {
        invoice_no: numbers.next(),
        source_visit_id: visit.id,
        invoice_date: visit.visit_date,
        customer_name: customer_name(record),
        customer_phone: visit.phone.clone().or_else(|| visit.patient_phone.clone()),
        customer_address: visit.address.clone(),
        lines,
        subtotal,
        tax: Decimal::ZERO,
        discount: Decimal::ZERO,
        total,
        paid_amount: total,
        balance: Decimal::ZERO,
        status: PAID_STATUS.to_string(),
        notes,
        consumption,
    })
}

/// Linked patient name, else the contact name stored on the visit, else a
/// generic placeholder.
fn customer_name(record: &VisitRecord) -> String {
    let visit = &record.visit;

    let patient_name = format!(
        "{} {}",
        visit.first_name.as_deref().unwrap_or(""),
        visit.last_name.as_deref().unwrap_or("")
    );
    let patient_name = patient_name.trim();
    if !patient_name.is_empty() {
        return patient_name.to_string();
    }

    if let Some(name) = visit.patient_name.as_deref() {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    FALLBACK_CUSTOMER_NAME.to_string()
}

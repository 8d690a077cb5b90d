//! Invoice ledger reader
//!
//! Computes the set of visits that already have an invoice, so re-runs
//! never produce duplicates. The structured `source_visit_id` column is
//! the primary source; the textual `visit ID: <n>` marker in the notes
//! field is still honored for invoices that predate the column.

use crate::{db::InvoiceRepository, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref VISIT_MARKER: Regex = Regex::new(r"visit ID: (\d+)").expect("valid marker regex");
}

/// Extract the source visit id from an invoice notes marker. Invoices
/// without the marker were not produced by the conversion engine and
/// yield `None`.
pub fn parse_visit_marker(notes: &str) -> Option<i64> {
    VISIT_MARKER
        .captures(notes)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Load the exclusion set of already-converted visit ids.
pub async fn load_converted_visit_ids(invoices: &InvoiceRepository) -> Result<HashSet<i64>> {
    let mut converted: HashSet<i64> = invoices.converted_visit_ids().await?.into_iter().collect();

    for notes in invoices.legacy_marker_notes().await? {
        if let Some(visit_id) = parse_visit_marker(&notes) {
            converted.insert(visit_id);
        }
    }

    Ok(converted)
}

//! Drafting behavior: line construction, fallbacks, rounding, numbering

use chrono::NaiveDate;
use praxis::models::{Prescription, ProductInfo, VisitRecord, VisitRow};
use praxis::services::conversion::drafter::{self, PAID_STATUS};
use praxis::services::conversion::ledger::parse_visit_marker;
use praxis::services::conversion::sequence::InvoiceNumberSequence;
use rust_decimal::Decimal;
use std::collections::HashMap;

fn visit(id: i64) -> VisitRow {
    VisitRow {
        id,
        patient_id: None,
        visit_date: NaiveDate::from_ymd_opt(2023, 5, 14).unwrap(),
        consultation_fee: None,
        patient_name: None,
        patient_phone: None,
        first_name: None,
        last_name: None,
        phone: None,
        address: None,
    }
}

fn prescription(visit_id: i64, product_id: Option<i64>, quantity: i32) -> Prescription {
    Prescription {
        id: 1,
        visit_id,
        product_id,
        quantity,
        unit_price: None,
    }
}

fn product(id: i64, name: &str, price: Decimal, on_hand: i32) -> ProductInfo {
    ProductInfo {
        id,
        name: name.to_string(),
        unit_price: price,
        quantity_on_hand: on_hand,
    }
}

fn catalog() -> HashMap<i64, ProductInfo> {
    let mut map = HashMap::new();
    map.insert(1, product(1, "Amoxicillin 500mg", Decimal::new(1250, 2), 40));
    map.insert(2, product(2, "Ibuprofen 200mg", Decimal::new(550, 2), 12));
    map
}

#[test]
fn consultation_fee_becomes_single_fallback_line() {
    let mut row = visit(7);
    row.consultation_fee = Some(Decimal::from(500));
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![],
    };
    let mut numbers = InvoiceNumberSequence::new(0);

    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert_eq!(draft.lines.len(), 1);
    let line = &draft.lines[0];
    assert_eq!(line.description, "Consultation fee");
    assert_eq!(line.quantity, 1);
    assert_eq!(line.unit_price, Decimal::from(500));
    assert_eq!(line.product_id, None);
    assert_eq!(draft.total, Decimal::from(500));
    assert_eq!(draft.paid_amount, Decimal::from(500));
    assert_eq!(draft.balance, Decimal::ZERO);
    assert_eq!(draft.status, PAID_STATUS);
    assert!(draft.consumption.is_empty());
}

#[test]
fn empty_visit_yields_no_draft_and_consumes_no_number() {
    let record = VisitRecord {
        visit: visit(8),
        prescriptions: vec![],
    };
    let mut numbers = InvoiceNumberSequence::new(10);

    assert!(drafter::draft_invoice(&record, &catalog(), &mut numbers).is_none());
    assert_eq!(numbers.peek(), 11);

    // A zero consultation fee is not billable either.
    let mut row = visit(9);
    row.consultation_fee = Some(Decimal::ZERO);
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![],
    };
    assert!(drafter::draft_invoice(&record, &catalog(), &mut numbers).is_none());
    assert_eq!(numbers.peek(), 11);
}

#[test]
fn prescriptions_become_lines_with_catalog_prices() {
    let mut first = prescription(20, Some(1), 2);
    first.unit_price = Some(Decimal::new(1300, 2)); // prescription price wins
    let second = prescription(20, Some(2), 3); // falls back to catalog price

    let record = VisitRecord {
        visit: visit(20),
        prescriptions: vec![first, second],
    };
    let mut numbers = InvoiceNumberSequence::new(0);

    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert_eq!(draft.lines.len(), 2);
    assert_eq!(draft.lines[0].description, "Amoxicillin 500mg");
    assert_eq!(draft.lines[0].unit_price, Decimal::new(1300, 2));
    assert_eq!(draft.lines[0].line_total, Decimal::new(2600, 2));
    assert_eq!(draft.lines[1].unit_price, Decimal::new(550, 2));
    assert_eq!(draft.lines[1].line_total, Decimal::new(1650, 2));
    assert_eq!(draft.subtotal, Decimal::new(4250, 2));
    assert_eq!(draft.consumption.get(&1), Some(&2));
    assert_eq!(draft.consumption.get(&2), Some(&3));
    assert_eq!(draft.tax, Decimal::ZERO);
}

#[test]
fn unbillable_prescriptions_fall_back_to_consultation_fee() {
    let mut row = visit(21);
    row.consultation_fee = Some(Decimal::from(300));
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![
            prescription(21, Some(1), 0),  // non-positive quantity
            prescription(21, None, 2),     // no product and no price
            prescription(21, Some(99), 1), // unknown product, no price
        ],
    };
    let mut numbers = InvoiceNumberSequence::new(0);

    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert_eq!(draft.lines.len(), 1);
    assert_eq!(draft.lines[0].description, "Consultation fee");
    assert_eq!(draft.total, Decimal::from(300));
}

#[test]
fn negative_unit_price_is_billed_as_absolute_value() {
    let mut rx = prescription(22, Some(1), 1);
    rx.unit_price = Some(Decimal::new(-1250, 2));
    let record = VisitRecord {
        visit: visit(22),
        prescriptions: vec![rx],
    };
    let mut numbers = InvoiceNumberSequence::new(0);

    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert_eq!(draft.lines[0].unit_price, Decimal::new(1250, 2));
}

#[test]
fn total_rounds_to_whole_currency_units() {
    let mut rx = prescription(23, Some(1), 3);
    rx.unit_price = Some(Decimal::new(3333, 2)); // 3 x 33.33 = 99.99
    let record = VisitRecord {
        visit: visit(23),
        prescriptions: vec![rx],
    };
    let mut numbers = InvoiceNumberSequence::new(0);

    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert_eq!(draft.subtotal, Decimal::new(9999, 2));
    assert_eq!(draft.total, Decimal::from(100));
    assert_eq!(draft.paid_amount, draft.total);
}

#[test]
fn notes_carry_the_visit_marker() {
    let mut row = visit(42);
    row.consultation_fee = Some(Decimal::from(150));
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![],
    };
    let mut numbers = InvoiceNumberSequence::new(0);

    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert!(draft.notes.contains("visit ID: 42"));
    assert!(draft.notes.contains("2023-05-14"));
    assert_eq!(parse_visit_marker(&draft.notes), Some(42));
    assert_eq!(draft.source_visit_id, 42);
}

#[test]
fn customer_fields_prefer_patient_then_visit_then_placeholder() {
    let mut row = visit(30);
    row.first_name = Some("Amina".to_string());
    row.last_name = Some("Diallo".to_string());
    row.phone = Some("555-0100".to_string());
    row.patient_name = Some("ignored".to_string());
    row.consultation_fee = Some(Decimal::from(100));
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![],
    };
    let mut numbers = InvoiceNumberSequence::new(0);
    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();
    assert_eq!(draft.customer_name, "Amina Diallo");
    assert_eq!(draft.customer_phone.as_deref(), Some("555-0100"));

    let mut row = visit(31);
    row.patient_name = Some("J. Doe".to_string());
    row.patient_phone = Some("555-0101".to_string());
    row.consultation_fee = Some(Decimal::from(100));
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![],
    };
    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();
    assert_eq!(draft.customer_name, "J. Doe");
    assert_eq!(draft.customer_phone.as_deref(), Some("555-0101"));

    let mut row = visit(32);
    row.consultation_fee = Some(Decimal::from(100));
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![],
    };
    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();
    assert_eq!(draft.customer_name, "Walk-in patient");
    assert_eq!(draft.customer_phone, None);
}

#[test]
fn known_price_for_unknown_product_is_billed_without_stock_tracking() {
    let mut rx = prescription(33, Some(99), 2);
    rx.unit_price = Some(Decimal::from(10));
    let record = VisitRecord {
        visit: visit(33),
        prescriptions: vec![rx],
    };
    let mut numbers = InvoiceNumberSequence::new(0);

    let draft = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert_eq!(draft.lines.len(), 1);
    assert_eq!(draft.lines[0].description, "Prescribed item");
    assert_eq!(draft.lines[0].product_id, None);
    assert!(draft.consumption.is_empty());
}

#[test]
fn invoice_numbers_are_strictly_increasing_across_drafts() {
    let mut numbers = InvoiceNumberSequence::new(41);

    let mut row = visit(1);
    row.consultation_fee = Some(Decimal::from(100));
    let record = VisitRecord {
        visit: row,
        prescriptions: vec![],
    };

    let first = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();
    let second = drafter::draft_invoice(&record, &catalog(), &mut numbers).unwrap();

    assert_eq!(first.invoice_no, 42);
    assert_eq!(second.invoice_no, 43);
    assert!(second.invoice_no > first.invoice_no);
}

//! Marker parsing and inventory balance arithmetic

use praxis::models::StockDirection;
use praxis::services::conversion::committer::next_balance;
use praxis::services::conversion::ledger::parse_visit_marker;

#[test]
fn parses_visit_id_from_generated_notes() {
    assert_eq!(
        parse_visit_marker("Generated from visit ID: 42 dated 2023-05-14"),
        Some(42)
    );
}

#[test]
fn parses_marker_from_legacy_note_formats() {
    // Wording around the marker varies in migrated data; only the fixed
    // substring matters.
    assert_eq!(
        parse_visit_marker("Auto-converted (visit ID: 1083, reviewed by admin)"),
        Some(1083)
    );
    assert_eq!(parse_visit_marker("visit ID: 7"), Some(7));
}

#[test]
fn invoices_without_marker_are_ignored() {
    assert_eq!(parse_visit_marker("Walk-in sale, paid cash"), None);
    assert_eq!(parse_visit_marker(""), None);
    // Similar words without the exact token do not match.
    assert_eq!(parse_visit_marker("visit 42"), None);
    assert_eq!(parse_visit_marker("visit ID: none"), None);
}

#[test]
fn first_marker_wins_when_notes_mention_several() {
    assert_eq!(
        parse_visit_marker("visit ID: 5, superseded by visit ID: 6"),
        Some(5)
    );
}

#[test]
fn stock_balance_never_goes_negative() {
    assert_eq!(next_balance(10, 4), 6);
    assert_eq!(next_balance(4, 4), 0);
    assert_eq!(next_balance(2, 5), 0);
    assert_eq!(next_balance(0, 1), 0);
}

#[test]
fn stock_directions_match_schema_labels() {
    assert_eq!(StockDirection::Outbound.as_str(), "out");
    assert_eq!(StockDirection::Inbound.as_str(), "in");
    assert_eq!(StockDirection::Outbound.to_string(), "out");
}

#![cfg(feature = "serde")]

//! Integration tests for the serialized shape of settlement records.

use rstest::rstest;
use serde_json::json;
use settle::settlement::{Settlement, Status};

// =============================================================================
// Settlement
// =============================================================================

#[rstest]
fn test_fulfilled_settlement_is_a_tagged_record() {
    let settlement: Settlement<i32, String> = Settlement::fulfilled(42);

    let value = serde_json::to_value(&settlement).unwrap();

    assert_eq!(value, json!({ "status": "fulfilled", "value": 42 }));
}

#[rstest]
fn test_rejected_settlement_is_a_tagged_record() {
    let settlement: Settlement<i32, String> = Settlement::rejected("timeout".to_string());

    let value = serde_json::to_value(&settlement).unwrap();

    assert_eq!(value, json!({ "status": "rejected", "reason": "timeout" }));
}

#[rstest]
fn test_settlements_deserialize_from_records() {
    let records = json!([
        { "status": "fulfilled", "value": 1 },
        { "status": "rejected", "reason": "x" },
    ]);

    let settlements: Vec<Settlement<i32, String>> = serde_json::from_value(records).unwrap();

    assert_eq!(
        settlements,
        vec![Settlement::fulfilled(1), Settlement::rejected("x".to_string())]
    );
}

#[rstest]
fn test_unknown_status_is_rejected() {
    let record = json!({ "status": "pending" });
    assert!(serde_json::from_value::<Settlement<i32, String>>(record).is_err());
}

// =============================================================================
// Status
// =============================================================================

#[rstest]
#[case(Status::Fulfilled, "\"fulfilled\"")]
#[case(Status::Rejected, "\"rejected\"")]
fn test_status_serializes_lowercase(#[case] status: Status, #[case] expected: &str) {
    assert_eq!(serde_json::to_string(&status).unwrap(), expected);
    assert_eq!(status.to_string(), expected.trim_matches('"'));
}

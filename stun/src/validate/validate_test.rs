use super::*;
use crate::agent::TransactionTable;
use crate::message::{BINDING_REQUEST, BINDING_SUCCESS};

#[test]
fn fast_pre_check_rejects_short_buffers() {
    assert_eq!(fast_pre_check(&[0u8; 3]), Err(ValidationResult::Incomplete));
}

#[test]
fn fast_pre_check_rejects_non_stun_top_bits() {
    let buf = [0xC0, 0, 0, 0];
    assert_eq!(fast_pre_check(&buf), Err(ValidationResult::NotStun));
}

#[test]
fn fast_pre_check_reports_incomplete_until_declared_length_present() {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_REQUEST)]).unwrap();
    let full_len = m.raw.len();
    assert_eq!(fast_pre_check(&m.raw[..full_len - 1]), Err(ValidationResult::Incomplete));
    assert_eq!(fast_pre_check(&m.raw), Ok(full_len));
}

#[test]
fn full_validate_accepts_a_plain_request() {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_REQUEST)]).unwrap();
    let mut decoded = Message::new();
    decoded.write(&m.raw).unwrap();

    let mut table = TransactionTable::new(8);
    assert_eq!(full_validate(&mut decoded, &mut table), ValidationResult::Success);
}

#[test]
fn full_validate_flags_unknown_mandatory_attribute_on_a_request() {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_REQUEST)]).unwrap();
    m.add(AttrType(0x7001), &[1, 2, 3, 4]);
    m.write_length();

    let mut decoded = Message::new();
    decoded.write(&m.raw).unwrap();

    let mut table = TransactionTable::new(8);
    assert_eq!(
        full_validate(&mut decoded, &mut table),
        ValidationResult::UnknownRequestAttribute
    );
}

#[test]
fn full_validate_flags_unmatched_response() {
    let mut m = Message::new();
    m.build(&[Box::new(BINDING_SUCCESS)]).unwrap();
    let mut decoded = Message::new();
    decoded.write(&m.raw).unwrap();

    let mut table = TransactionTable::new(8);
    assert_eq!(
        full_validate(&mut decoded, &mut table),
        ValidationResult::UnmatchedResponse
    );
}

#[test]
fn full_validate_matches_response_against_table_and_forgets_it() {
    let mut req = Message::new();
    req.build(&[Box::new(BINDING_REQUEST)]).unwrap();

    let mut table = TransactionTable::new(8);
    table
        .finish_request(req.transaction_id, METHOD_BINDING, Vec::new(), false)
        .unwrap();

    let mut resp = Message::new();
    resp.transaction_id = req.transaction_id;
    resp.build(&[Box::new(BINDING_SUCCESS)]).unwrap();

    let mut decoded = Message::new();
    decoded.write(&resp.raw).unwrap();

    assert_eq!(full_validate(&mut decoded, &mut table), ValidationResult::Success);
    assert!(table.get(&req.transaction_id).is_none());
}

#[test]
fn full_validate_rejects_garbage_as_not_stun() {
    let mut garbage = Message::new();
    garbage.raw = vec![0xff; 20];
    let mut table = TransactionTable::new(8);
    assert_eq!(full_validate(&mut garbage, &mut table), ValidationResult::NotStun);
}

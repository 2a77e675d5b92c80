use super::*;
use crate::message::METHOD_BINDING;

#[test]
fn test_transaction_table_finish_and_forget() {
    let mut table = TransactionTable::new(4);
    let id = TransactionId::new();

    table
        .finish_request(id, METHOD_BINDING, b"pass".to_vec(), false)
        .unwrap();
    assert_eq!(table.len(), 1);

    let binding = table.get(&id).expect("binding should be present");
    assert_eq!(binding.method, METHOD_BINDING);
    assert!(!binding.long_term);

    let forgotten = table.forget(&id).expect("forget should return the binding");
    assert_eq!(forgotten.id, id);
    assert!(table.is_empty());
    assert!(table.get(&id).is_none());
}

#[test]
fn test_transaction_table_rejects_duplicate_id() {
    let mut table = TransactionTable::new(4);
    let id = TransactionId::new();

    table
        .finish_request(id, METHOD_BINDING, vec![], false)
        .unwrap();

    let err = table
        .finish_request(id, METHOD_BINDING, vec![], false)
        .unwrap_err();
    assert_eq!(err, Error::ErrTransactionExists);
}

#[test]
fn test_transaction_table_rejects_when_full() {
    let mut table = TransactionTable::new(2);
    table
        .finish_request(TransactionId::new(), METHOD_BINDING, vec![], false)
        .unwrap();
    table
        .finish_request(TransactionId::new(), METHOD_BINDING, vec![], false)
        .unwrap();

    let err = table
        .finish_request(TransactionId::new(), METHOD_BINDING, vec![], false)
        .unwrap_err();
    assert_eq!(err, Error::ErrTransactionTableFull);
}

#[test]
fn test_transaction_id_is_random() {
    let a = TransactionId::new();
    let b = TransactionId::new();
    assert_ne!(a, b);
}

#[cfg(test)]
mod agent_test;

use crate::error::{Error, Result};
use crate::message::*;

use rand::Rng;

use std::collections::HashMap;

/// Default capacity of a [`TransactionTable`], sufficient for the handful of
/// outstanding checks or discoveries a single ICE component keeps in flight.
pub const DEFAULT_TRANSACTION_TABLE_CAPACITY: usize = 256;

#[derive(PartialEq, Eq, Hash, Copy, Clone, Default, Debug)]
pub struct TransactionId(pub [u8; TRANSACTION_ID_SIZE]);

impl TransactionId {
    /// Returns a new random transaction ID using the system RNG.
    pub fn new() -> Self {
        let mut b = TransactionId([0u8; TRANSACTION_ID_SIZE]);
        rand::thread_rng().fill(&mut b.0);
        b
    }
}

impl Setter for TransactionId {
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.transaction_id = *self;
        m.write_transaction_id();
        Ok(())
    }
}

/// The key and bookkeeping a caller needs to finish validating a response
/// once it arrives: which method was requested, and whether the key was
/// derived from long-term or short-term credentials.
#[derive(Clone, Debug)]
pub struct TransactionBinding {
    pub id: TransactionId,
    pub method: Method,
    pub key: Vec<u8>,
    pub long_term: bool,
}

/// A fixed-size slotted set of outstanding requests.
///
/// Entries are inserted by [`TransactionTable::finish_request`] once a
/// request has been built and sent, looked up by transaction id when a
/// response arrives, and forgotten either explicitly (the caller gave up
/// retransmitting) or implicitly (the lookup that matches a response also
/// removes it, since a transaction id is valid for exactly one response).
pub struct TransactionTable {
    capacity: usize,
    bindings: HashMap<TransactionId, TransactionBinding>,
}

impl TransactionTable {
    pub fn new(capacity: usize) -> Self {
        TransactionTable {
            capacity,
            bindings: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.bindings.len() >= self.capacity
    }

    /// Registers a finished (built, keyed, and about to be sent) request.
    /// Fails with [`Error::ErrTransactionExists`] if the id is already
    /// tracked, or [`Error::ErrAgentClosed`]-adjacent
    /// [`Error::ErrTransactionTableFull`] if the table is at capacity; the
    /// caller must back off and retry later rather than send the request.
    pub fn finish_request(
        &mut self,
        id: TransactionId,
        method: Method,
        key: Vec<u8>,
        long_term: bool,
    ) -> Result<()> {
        if self.bindings.contains_key(&id) {
            return Err(Error::ErrTransactionExists);
        }
        if self.is_full() {
            return Err(Error::ErrTransactionTableFull);
        }
        self.bindings.insert(
            id,
            TransactionBinding {
                id,
                method,
                key,
                long_term,
            },
        );
        Ok(())
    }

    /// Looks up the binding for an inbound response's transaction id without
    /// removing it. Used by a fast path that wants to peek before deciding
    /// whether to forget.
    pub fn get(&self, id: &TransactionId) -> Option<&TransactionBinding> {
        self.bindings.get(id)
    }

    /// Removes and returns the binding for `id`, if any. Called once a
    /// response has been fully matched, or when a caller abandons
    /// retransmission after a timeout.
    pub fn forget(&mut self, id: &TransactionId) -> Option<TransactionBinding> {
        self.bindings.remove(id)
    }
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new(DEFAULT_TRANSACTION_TABLE_CAPACITY)
    }
}

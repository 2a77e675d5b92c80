#[cfg(test)]
mod validate_test;

use crate::agent::TransactionTable;
use crate::attributes::*;
use crate::integrity::MessageIntegrity;
use crate::message::*;

/// Outcome of validating an inbound buffer or decoded message.
///
/// Named after the distinct failure reasons a caller needs to branch on;
/// the codec never panics on malformed input, it reports one of these.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Success,
    NotStun,
    Incomplete,
    BadRequest,
    Unauthorized,
    UnauthorizedBadRequest,
    UnmatchedResponse,
    UnknownRequestAttribute,
    UnknownAttribute,
}

/// Inspects only the first four bytes and the declared length of `buf`.
///
/// Returns the expected total byte count (header + body) on success, so the
/// caller knows how much of its buffer to hand to [`full_validate`]. This is
/// deliberately cheap: no attribute walk, no magic-cookie check, so it can be
/// run on every inbound datagram before deciding whether a message is even
/// worth assembling.
pub fn fast_pre_check(buf: &[u8]) -> std::result::Result<usize, ValidationResult> {
    if buf.len() < 4 {
        return Err(ValidationResult::Incomplete);
    }
    // The top two bits of a STUN message type are always zero (RFC 5389
    // §6); this is what lets a STUN message share a port with RTP.
    if buf[0] & 0xC0 != 0 {
        return Err(ValidationResult::NotStun);
    }
    let declared_len = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let expected = MESSAGE_HEADER_SIZE + declared_len;
    if buf.len() < expected {
        return Err(ValidationResult::Incomplete);
    }
    Ok(expected)
}

fn is_comprehension_required(t: AttrType) -> bool {
    t.0 < 0x8000
}

/// Known-attribute allowlist used to flag unknown comprehension-required
/// attributes in inbound requests. Extend as new attributes are wired up.
fn is_known_attribute(t: AttrType) -> bool {
    matches!(
        t,
        ATTR_MAPPED_ADDRESS
            | ATTR_USERNAME
            | ATTR_ERROR_CODE
            | ATTR_MESSAGE_INTEGRITY
            | ATTR_MESSAGE_INTEGRITY_SHA256
            | ATTR_UNKNOWN_ATTRIBUTES
            | ATTR_REALM
            | ATTR_NONCE
            | ATTR_XORMAPPED_ADDRESS
            | ATTR_SOFTWARE
            | ATTR_ALTERNATE_SERVER
            | ATTR_FINGERPRINT
            | ATTR_PRIORITY
            | ATTR_USE_CANDIDATE
            | ATTR_ICE_CONTROLLED
            | ATTR_ICE_CONTROLLING
            | ATTR_CHANNEL_NUMBER
            | ATTR_LIFETIME
            | ATTR_XOR_PEER_ADDRESS
            | ATTR_DATA
            | ATTR_XOR_RELAYED_ADDRESS
            | ATTR_EVEN_PORT
            | ATTR_REQUESTED_TRANSPORT
            | ATTR_DONT_FRAGMENT
            | ATTR_RESERVATION_TOKEN
            | ATTR_CONNECTION_ID
            | ATTR_REQUESTED_ADDRESS_FAMILY
            | ATTR_PASSWORD_ALGORITHM
            | ATTR_PASSWORD_ALGORITHMS
            | ATTR_USER_HASH
            | ATTR_ALTERNATE_DOMAIN
    )
}

/// Walks every attribute of an already-decoded message and checks the
/// ordering rule (RFC 5389 §15.4/§15.5): only FINGERPRINT may follow
/// MESSAGE-INTEGRITY, and nothing may follow FINGERPRINT.
fn check_attribute_ordering(m: &Message) -> bool {
    let mut seen_integrity = false;
    let mut seen_fingerprint = false;
    for a in &m.attributes.0 {
        if seen_fingerprint {
            return false;
        }
        if a.typ == ATTR_FINGERPRINT {
            seen_fingerprint = true;
            continue;
        }
        if seen_integrity {
            return false;
        }
        if a.typ == ATTR_MESSAGE_INTEGRITY {
            seen_integrity = true;
        }
    }
    true
}

/// The full attribute-walking validation pass (RFC 5389 §6).
///
/// `m.raw` must already hold exactly one candidate STUN message (as sized by
/// [`fast_pre_check`]); this function decodes it, rejects malformed framing
/// and bad attribute ordering, matches responses against `table` by
/// transaction id, and checks MESSAGE-INTEGRITY where present. It never
/// aborts: every failure mode is a distinct [`ValidationResult`].
pub fn full_validate(m: &mut Message, table: &mut TransactionTable) -> ValidationResult {
    if !is_message(&m.raw) {
        return ValidationResult::NotStun;
    }
    if m.decode().is_err() {
        return ValidationResult::BadRequest;
    }
    if !check_attribute_ordering(m) {
        return ValidationResult::BadRequest;
    }

    let has_unknown_mandatory = m
        .attributes
        .0
        .iter()
        .any(|a| is_comprehension_required(a.typ) && !is_known_attribute(a.typ));

    if m.typ.class == CLASS_SUCCESS_RESPONSE || m.typ.class == CLASS_ERROR_RESPONSE {
        let binding = match table.get(&m.transaction_id) {
            Some(b) if b.method == m.typ.method => b.clone(),
            Some(_) | None => return ValidationResult::UnmatchedResponse,
        };
        table.forget(&m.transaction_id);

        if m.contains(ATTR_MESSAGE_INTEGRITY) {
            if MessageIntegrity(binding.key).check(m).is_err() {
                return ValidationResult::Unauthorized;
            }
        }
        return ValidationResult::Success;
    }

    if m.typ.class == CLASS_REQUEST && has_unknown_mandatory {
        return ValidationResult::UnknownRequestAttribute;
    }
    if has_unknown_mandatory {
        return ValidationResult::UnknownAttribute;
    }

    ValidationResult::Success
}

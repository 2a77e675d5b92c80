pub mod addr;
pub mod chandata;
pub mod channum;
pub mod data;
pub mod evenport;
pub mod lifetime;
pub mod peeraddr;
pub mod relayaddr;
pub mod reqtrans;
pub mod reservation_token;

use std::fmt;

/// `PROTO_TCP` is 6 (IANA protocol number).
pub const PROTO_TCP: Protocol = Protocol(6);
/// `PROTO_UDP` is 17 (IANA protocol number).
pub const PROTO_UDP: Protocol = Protocol(17);

/// `Protocol` is IANA assigned protocol number.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Default, Hash)]
pub struct Protocol(pub u8);

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            PROTO_UDP => "UDP",
            PROTO_TCP => "TCP",
            _ => "unknown",
        };
        write!(f, "{s}")
    }
}

use std::fmt;

use stun::attributes::*;
use stun::message::*;
use stun::{Error, Result};

use super::Protocol;

const REQUESTED_TRANSPORT_SIZE: usize = 4;

/// RequestedTransport represents the REQUESTED-TRANSPORT attribute.
///
/// This attribute is used by the client to request a specific transport
/// protocol for the allocated transport address. Only UDP (protocol 17)
/// is currently supported by this crate.
///
/// https://tools.ietf.org/html/rfc5766#section-14.7
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub struct RequestedTransport {
    pub protocol: Protocol,
}

impl fmt::Display for RequestedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol: {}", self.protocol)
    }
}

impl Setter for RequestedTransport {
    // add_to adds REQUESTED-TRANSPORT to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let v = [self.protocol.0, 0, 0, 0]; // RFFU = 0
        m.add(ATTR_REQUESTED_TRANSPORT, &v);
        Ok(())
    }
}

impl Getter for RequestedTransport {
    // get_from decodes REQUESTED-TRANSPORT from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_REQUESTED_TRANSPORT)?;

        if v.len() != REQUESTED_TRANSPORT_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        self.protocol = Protocol(v[0]);

        Ok(())
    }
}

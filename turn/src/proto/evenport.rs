use stun::attributes::*;
use stun::message::*;
use stun::{Error, Result};

const EVEN_PORT_SIZE: usize = 1;

/// `EVEN_PORT_FLAG` is set in the EVEN-PORT value's most-significant bit
/// to request that the relayed address have an even port number.
const EVEN_PORT_FLAG: u8 = 1 << 7;

/// EvenPort represents the EVEN-PORT attribute.
///
/// https://tools.ietf.org/html/rfc5766#section-14.6
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub struct EvenPort {
    pub requested_port_props: bool,
}

impl Setter for EvenPort {
    // add_to adds EVEN-PORT to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let v = if self.requested_port_props {
            [EVEN_PORT_FLAG]
        } else {
            [0]
        };
        m.add(ATTR_EVEN_PORT, &v);
        Ok(())
    }
}

impl Getter for EvenPort {
    // get_from decodes EVEN-PORT from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_EVEN_PORT)?;

        if v.len() < EVEN_PORT_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        self.requested_port_props = v[0] & EVEN_PORT_FLAG != 0;

        Ok(())
    }
}

use stun::attributes::*;
use stun::message::*;
use stun::{Error, Result};

const RESERVATION_TOKEN_SIZE: usize = 8;

/// ReservationToken represents the RESERVATION-TOKEN attribute.
///
/// https://tools.ietf.org/html/rfc5766#section-14.9
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct ReservationToken(pub Vec<u8>);

impl Setter for ReservationToken {
    // add_to adds RESERVATION-TOKEN to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        if self.0.len() != RESERVATION_TOKEN_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }
        m.add(ATTR_RESERVATION_TOKEN, &self.0);
        Ok(())
    }
}

impl Getter for ReservationToken {
    // get_from decodes RESERVATION-TOKEN from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_RESERVATION_TOKEN)?;

        if v.len() != RESERVATION_TOKEN_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        self.0 = v;

        Ok(())
    }
}

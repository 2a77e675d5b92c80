use std::fmt;

use stun::attributes::*;
use stun::message::*;
use stun::{Error, Result};

// ChannelNumber is the CHANNEL-NUMBER attribute.
//
// The CHANNEL-NUMBER attribute contains the number of the channel.
//
// https://tools.ietf.org/html/rfc5766#section-14.1
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default, Hash)]
pub struct ChannelNumber(pub u16);

const CHANNEL_NUMBER_SIZE: usize = 4;

impl fmt::Display for ChannelNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Setter for ChannelNumber {
    // add_to adds CHANNEL-NUMBER to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let v = [
            (self.0 >> 8) as u8,
            (self.0 & 0xFF) as u8,
            0,
            0, // RFFU = 0
        ];
        m.add(ATTR_CHANNEL_NUMBER, &v);
        Ok(())
    }
}

impl Getter for ChannelNumber {
    // get_from decodes CHANNEL-NUMBER from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_CHANNEL_NUMBER)?;

        if v.len() != CHANNEL_NUMBER_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        self.0 = u16::from_be_bytes([v[0], v[1]]);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_number_round_trips() {
        let mut m = Message::new();
        let n = ChannelNumber(0x4001);
        n.add_to(&mut m).unwrap();
        m.write_header();

        let mut decoded = Message::new();
        decoded.raw = m.raw.clone();
        decoded.decode().unwrap();

        let mut got = ChannelNumber::default();
        got.get_from(&decoded).unwrap();
        assert_eq!(got, n);
    }
}

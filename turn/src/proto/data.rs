use std::fmt;

use stun::attributes::*;
use stun::message::*;
use stun::Result;

// Data is the DATA attribute.
//
// Data carries the application data that is relayed by the server
// between the client and a peer.
//
// https://tools.ietf.org/html/rfc5766#section-14.4
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Data(pub Vec<u8>);

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Setter for Data {
    // add_to adds DATA to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        m.add(ATTR_DATA, &self.0);
        Ok(())
    }
}

impl Getter for Data {
    // get_from decodes DATA from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        self.0 = m.get(ATTR_DATA)?;
        Ok(())
    }
}

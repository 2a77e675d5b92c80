use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use stun::attributes::*;
use stun::message::*;
use stun::Result;

use super::peeraddr::{xor_addr_add_to, xor_addr_get_from};

// RelayedAddress is a XOR-RELAYED-ADDRESS attribute.
//
// https://tools.ietf.org/html/rfc5766#section-14.5
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct RelayedAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl Default for RelayedAddress {
    fn default() -> Self {
        RelayedAddress {
            ip: IpAddr::V4(Ipv4Addr::from(0)),
            port: 0,
        }
    }
}

impl fmt::Display for RelayedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl Setter for RelayedAddress {
    // add_to adds XOR-RELAYED-ADDRESS to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        xor_addr_add_to(ATTR_XOR_RELAYED_ADDRESS, self.ip, self.port, m)
    }
}

impl Getter for RelayedAddress {
    // get_from decodes XOR-RELAYED-ADDRESS from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let (ip, port) = xor_addr_get_from(ATTR_XOR_RELAYED_ADDRESS, m)?;
        self.ip = ip;
        self.port = port;
        Ok(())
    }
}

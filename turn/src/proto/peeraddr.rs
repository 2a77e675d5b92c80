use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use stun::attributes::*;
use stun::message::*;
use stun::xoraddr::xor_bytes;
use stun::{Error, Result};

const FAMILY_IPV4: u16 = 0x01;
const FAMILY_IPV6: u16 = 0x02;
const IPV4LEN: usize = 4;
const IPV6LEN: usize = 16;

// PeerAddress is a XOR-PEER-ADDRESS attribute.
//
// https://tools.ietf.org/html/rfc5766#section-14.3
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct PeerAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl Default for PeerAddress {
    fn default() -> Self {
        PeerAddress {
            ip: IpAddr::V4(Ipv4Addr::from(0)),
            port: 0,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl Setter for PeerAddress {
    // add_to adds XOR-PEER-ADDRESS to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        xor_addr_add_to(ATTR_XOR_PEER_ADDRESS, self.ip, self.port, m)
    }
}

impl Getter for PeerAddress {
    // get_from decodes XOR-PEER-ADDRESS from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let (ip, port) = xor_addr_get_from(ATTR_XOR_PEER_ADDRESS, m)?;
        self.ip = ip;
        self.port = port;
        Ok(())
    }
}

pub(crate) fn xor_addr_add_to(t: AttrType, ip: IpAddr, port: u16, m: &mut Message) -> Result<()> {
    let (family, ip_len, octets) = match ip {
        IpAddr::V4(ipv4) => (FAMILY_IPV4, IPV4LEN, ipv4.octets().to_vec()),
        IpAddr::V6(ipv6) => (FAMILY_IPV6, IPV6LEN, ipv6.octets().to_vec()),
    };

    let mut value = vec![0u8; 4 + ip_len];
    value[0..2].copy_from_slice(&family.to_be_bytes());
    value[2..4].copy_from_slice(&(port ^ (MAGIC_COOKIE >> 16) as u16).to_be_bytes());

    let mut xor_value = vec![0u8; IPV6LEN];
    xor_value[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    xor_value[4..].copy_from_slice(&m.transaction_id.0);
    xor_bytes(&mut value[4..4 + ip_len], &octets, &xor_value);

    m.add(t, &value);
    Ok(())
}

pub(crate) fn xor_addr_get_from(t: AttrType, m: &Message) -> Result<(IpAddr, u16)> {
    let v = m.get(t)?;
    if v.len() <= 4 {
        return Err(Error::ErrUnexpectedEof);
    }

    let family = u16::from_be_bytes([v[0], v[1]]);
    if family != FAMILY_IPV4 && family != FAMILY_IPV6 {
        return Err(Error::Other(format!("bad value {family}")));
    }

    let port = u16::from_be_bytes([v[2], v[3]]) ^ (MAGIC_COOKIE >> 16) as u16;

    let mut xor_value = vec![0u8; 4 + TRANSACTION_ID_SIZE];
    xor_value[0..4].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    xor_value[4..].copy_from_slice(&m.transaction_id.0);

    let ip = if family == FAMILY_IPV6 {
        if v[4..].len() < IPV6LEN {
            return Err(Error::ErrUnexpectedEof);
        }
        let mut ip = [0u8; IPV6LEN];
        xor_bytes(&mut ip, &v[4..4 + IPV6LEN], &xor_value);
        IpAddr::V6(Ipv6Addr::from(ip))
    } else {
        if v[4..].len() < IPV4LEN {
            return Err(Error::ErrUnexpectedEof);
        }
        let mut ip = [0u8; IPV4LEN];
        xor_bytes(&mut ip, &v[4..4 + IPV4LEN], &xor_value);
        IpAddr::V4(Ipv4Addr::from(ip))
    };

    Ok((ip, port))
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use stun::agent::TransactionId;

    use super::*;

    #[test]
    fn peer_address_round_trips() {
        let mut m = Message::new();
        m.transaction_id = TransactionId::new();
        let addr = PeerAddress {
            ip: IpAddr::from_str("203.0.113.5").unwrap(),
            port: 49170,
        };
        addr.add_to(&mut m).unwrap();
        m.write_header();

        let mut decoded = Message::new();
        decoded.raw = m.raw.clone();
        decoded.decode().unwrap();

        let mut got = PeerAddress::default();
        got.get_from(&decoded).unwrap();
        assert_eq!(got, addr);
    }
}

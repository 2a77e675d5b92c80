use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use util::Error;

/// The largest buffer a [`SocketAddr`] can ever `encode` into: family tag (1) +
/// an IPv6 address (16) + port (2) + scope id (4).
pub(crate) const MAX_ADDR_SIZE: usize = 1 + 16 + 2 + 4;

const FAMILY_V4: u8 = 4;
const FAMILY_V6: u8 = 6;

/// Compact binary encoding for a [`SocketAddr`], used to tag packets buffered
/// by [`super::UDPMuxConn`] with the peer address they came from.
pub(crate) trait SocketAddrExt {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, Error>;
    fn decode(buf: &[u8]) -> Result<SocketAddr, Error>;
}

impl SocketAddrExt for SocketAddr {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            SocketAddr::V4(addr) => {
                if buf.len() < 7 {
                    return Err(Error::ErrBufferShort);
                }
                buf[0] = FAMILY_V4;
                buf[1..5].copy_from_slice(&addr.ip().octets());
                buf[5..7].copy_from_slice(&addr.port().to_be_bytes());
                Ok(7)
            }
            SocketAddr::V6(addr) => {
                if buf.len() < MAX_ADDR_SIZE {
                    return Err(Error::ErrBufferShort);
                }
                buf[0] = FAMILY_V6;
                buf[1..17].copy_from_slice(&addr.ip().octets());
                buf[17..19].copy_from_slice(&addr.port().to_be_bytes());
                buf[19..23].copy_from_slice(&addr.scope_id().to_be_bytes());
                Ok(MAX_ADDR_SIZE)
            }
        }
    }

    fn decode(buf: &[u8]) -> Result<SocketAddr, Error> {
        match buf.first() {
            Some(&FAMILY_V4) => {
                if buf.len() < 7 {
                    return Err(Error::ErrBufferShort);
                }
                let ip = Ipv4Addr::new(buf[1], buf[2], buf[3], buf[4]);
                let port = u16::from_be_bytes([buf[5], buf[6]]);
                Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
            }
            Some(&FAMILY_V6) => {
                if buf.len() < MAX_ADDR_SIZE {
                    return Err(Error::ErrBufferShort);
                }
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[1..17]);
                let port = u16::from_be_bytes([buf[17], buf[18]]);
                let scope_id = u32::from_be_bytes([buf[19], buf[20], buf[21], buf[22]]);
                Ok(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(octets),
                    port,
                    0,
                    scope_id,
                )))
            }
            _ => Err(Error::ErrBufferShort),
        }
    }
}

#[cfg(test)]
mod test {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn round_trips_v4() {
        let addr = SocketAddr::from_str("192.168.0.1:4242").unwrap();
        let mut buf = [0u8; MAX_ADDR_SIZE];
        let n = addr.encode(&mut buf).unwrap();
        assert_eq!(SocketAddr::decode(&buf[..n]).unwrap(), addr);
    }

    #[test]
    fn round_trips_v6() {
        let addr = SocketAddr::from_str("[2001:db8::1]:4242").unwrap();
        let mut buf = [0u8; MAX_ADDR_SIZE];
        let n = addr.encode(&mut buf).unwrap();
        assert_eq!(SocketAddr::decode(&buf[..n]).unwrap(), addr);
    }
}

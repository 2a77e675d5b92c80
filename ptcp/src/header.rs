use std::convert::TryInto;

use crate::error::{Error, Result};

/// Size in bytes of the wire header every pseudo-TCP segment carries.
pub const HEADER_SIZE: usize = 24;

/// Segment flags. Unlike real TCP these are mutually exclusive in practice:
/// a segment is either plain data (`NONE`), a control segment carrying the
/// CONNECT handshake (`CTL`), a half-close marker (`FIN`), or an abort
/// (`RST`).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flags {
    None,
    Fin,
    Ctl,
    Rst,
}

impl Flags {
    fn to_bits(self) -> u8 {
        match self {
            Flags::None => 0,
            Flags::Fin => 1,
            Flags::Ctl => 2,
            Flags::Rst => 3,
        }
    }

    fn from_bits(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Flags::None),
            1 => Ok(Flags::Fin),
            2 => Ok(Flags::Ctl),
            3 => Ok(Flags::Rst),
            _ => Err(Error::ErrMalformedHeader),
        }
    }
}

/// The 24-byte header carried by every datagram this engine hands to
/// `WritePacket`. `window` is the receiver's advertised window, already
/// scaled by the negotiated window-scale factor if one was agreed during the
/// handshake. `tsval`/`tsecr` mirror TCP timestamps (RFC 7323): `tsval` is
/// the sender's own clock at send time, `tsecr` echoes the peer's `tsval`
/// last seen, and together they drive the Karn-safe RTT estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub conv: u32,
    pub seq: u32,
    pub ack: u32,
    pub flags: Flags,
    pub window: u16,
    pub tsval: u32,
    pub tsecr: u32,
}

impl Header {
    pub fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.conv.to_be_bytes());
        buf[4..8].copy_from_slice(&self.seq.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ack.to_be_bytes());
        buf[12] = self.flags.to_bits();
        // buf[13] reserved, kept zero
        buf[14..16].copy_from_slice(&self.window.to_be_bytes());
        buf[16..20].copy_from_slice(&self.tsval.to_be_bytes());
        buf[20..24].copy_from_slice(&self.tsecr.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::ErrMalformedHeader);
        }
        Ok(Header {
            conv: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            seq: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            ack: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            flags: Flags::from_bits(buf[12])?,
            window: u16::from_be_bytes(buf[14..16].try_into().unwrap()),
            tsval: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            tsecr: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let h = Header {
            conv: 0xdead_beef,
            seq: 42,
            ack: 7,
            flags: Flags::Fin,
            window: 65000,
            tsval: 123456,
            tsecr: 654321,
        };
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let back = Header::from_bytes(&bytes).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn rejects_truncated_buffers() {
        assert_eq!(
            Header::from_bytes(&[0u8; HEADER_SIZE - 1]),
            Err(Error::ErrMalformedHeader)
        );
    }

    #[test]
    fn rejects_unknown_flag_bits() {
        let mut bytes = Header {
            conv: 1,
            seq: 1,
            ack: 1,
            flags: Flags::None,
            window: 1,
            tsval: 1,
            tsecr: 1,
        }
        .to_bytes();
        bytes[12] = 0xff;
        assert_eq!(Header::from_bytes(&bytes), Err(Error::ErrMalformedHeader));
    }
}

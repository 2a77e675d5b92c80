use crate::error::{Error, Result};

/// The one-byte opcode carried by the CTL segment that opens a connection.
/// Only `Connect` is defined; any other value received in a CTL segment is
/// treated as malformed rather than silently ignored, since a CTL segment
/// only ever carries the handshake in this engine.
pub const CONNECT_OPCODE: u8 = 1;

const OPT_MSS: u8 = 1;
const OPT_WND_SCALE: u8 = 3;
const OPT_FIN_ACK: u8 = 4;

/// Options exchanged in the CONNECT handshake. Absence of window-scale
/// disables scaling on both sides; FIN-ACK graceful shutdown is enabled only
/// if both peers advertise it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    pub mss: u16,
    pub wnd_scale: Option<u8>,
    pub supports_fin_ack: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            mss: crate::socket::DEFAULT_MSS,
            wnd_scale: Some(0),
            supports_fin_ack: true,
        }
    }
}

impl ConnectOptions {
    /// Serialises as `[CONNECT_OPCODE, (tag, len, value)*]`, the body of a
    /// CTL segment.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![CONNECT_OPCODE];

        buf.push(OPT_MSS);
        buf.push(2);
        buf.extend_from_slice(&self.mss.to_be_bytes());

        if let Some(scale) = self.wnd_scale {
            buf.push(OPT_WND_SCALE);
            buf.push(1);
            buf.push(scale);
        }

        if self.supports_fin_ack {
            buf.push(OPT_FIN_ACK);
            buf.push(0);
        }

        buf
    }

    /// Parses the body of an inbound CONNECT CTL segment. Unknown option
    /// tags are skipped by their declared length rather than rejected, so a
    /// future extension to this handshake does not break older peers.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() || buf[0] != CONNECT_OPCODE {
            return Err(Error::ErrMalformedOptions);
        }

        let mut opts = ConnectOptions {
            mss: crate::socket::DEFAULT_MSS,
            wnd_scale: None,
            supports_fin_ack: false,
        };

        let mut i = 1;
        while i < buf.len() {
            if i + 2 > buf.len() {
                return Err(Error::ErrMalformedOptions);
            }
            let tag = buf[i];
            let len = buf[i + 1] as usize;
            let start = i + 2;
            let end = start + len;
            if end > buf.len() {
                return Err(Error::ErrMalformedOptions);
            }
            let val = &buf[start..end];
            match tag {
                OPT_MSS if len == 2 => {
                    opts.mss = u16::from_be_bytes([val[0], val[1]]);
                }
                OPT_WND_SCALE if len == 1 => {
                    opts.wnd_scale = Some(val[0]);
                }
                OPT_FIN_ACK => {
                    opts.supports_fin_ack = true;
                }
                _ => {
                    // Unknown or mis-sized option for a tag we do know: skip.
                }
            }
            i = end;
        }

        Ok(opts)
    }

    /// Options agreed by both sides: the smaller MSS, scaling only if both
    /// advertised a scale, FIN-ACK only if both advertised it.
    pub fn negotiate(local: &ConnectOptions, remote: &ConnectOptions) -> ConnectOptions {
        ConnectOptions {
            mss: local.mss.min(remote.mss),
            wnd_scale: match (local.wnd_scale, remote.wnd_scale) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
            supports_fin_ack: local.supports_fin_ack && remote.supports_fin_ack,
        }
    }
}

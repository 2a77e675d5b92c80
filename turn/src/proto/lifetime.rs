use std::fmt;
use std::time::Duration;

use stun::attributes::*;
use stun::message::*;
use stun::{Error, Result};

/// `DEFAULT_LIFETIME` is the default time an [`Allocation`](crate::allocation::Allocation)
/// is valid for if a client doesn't request a specific lifetime.
///
/// https://tools.ietf.org/html/rfc5766#section-2.2
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(10 * 60);

const LIFETIME_SIZE: usize = 4; // 4 bytes

/// Lifetime represents the LIFETIME attribute.
///
/// https://tools.ietf.org/html/rfc5766#section-14.2
#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub struct Lifetime(pub Duration);

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl Setter for Lifetime {
    // add_to adds LIFETIME to message.
    fn add_to(&self, m: &mut Message) -> Result<()> {
        let secs = self.0.as_secs();
        if secs > u32::MAX as u64 {
            return Err(Error::Other("lifetime overflows u32".to_owned()));
        }
        m.add(ATTR_LIFETIME, &(secs as u32).to_be_bytes());
        Ok(())
    }
}

impl Getter for Lifetime {
    // get_from decodes LIFETIME from message.
    fn get_from(&mut self, m: &Message) -> Result<()> {
        let v = m.get(ATTR_LIFETIME)?;

        if v.len() != LIFETIME_SIZE {
            return Err(Error::ErrAttributeSizeInvalid);
        }

        let secs = u32::from_be_bytes([v[0], v[1], v[2], v[3]]);
        self.0 = Duration::from_secs(secs as u64);

        Ok(())
    }
}

use crate::attributes::*;
use crate::error::{Error, Result};

/// Returns `ErrAttributeSizeInvalid` if `got` is not equal to `expected`.
pub fn check_size(_at: AttrType, got: usize, expected: usize) -> Result<()> {
    if got == expected {
        Ok(())
    } else {
        Err(Error::ErrAttributeSizeInvalid)
    }
}

/// Returns `ErrAttributeSizeOverflow` if `got` is bigger than `max`.
pub fn check_overflow(_at: AttrType, got: usize, max: usize) -> Result<()> {
    if got <= max {
        Ok(())
    } else {
        Err(Error::ErrAttributeSizeOverflow)
    }
}

/// Returns true if `err` is an `ErrAttributeSizeInvalid`, as produced by `check_size`.
pub fn is_attr_size_invalid(err: &Error) -> bool {
    matches!(err, Error::ErrAttributeSizeInvalid)
}

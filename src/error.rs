//! Error taxonomy for the buffer pool core.
//!
//! Resource exhaustion ("no victim frame") is not an error — it is the
//! `Ok(None)` return of `pin`/`pin_new`. `PoolError` covers only the I/O
//! failures that must propagate to the caller.

use std::error::Error;
use std::fmt::{self, Display};

#[derive(Debug)]
pub enum PoolError {
    Io(std::io::Error),
}

impl Error for PoolError {}

impl Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Io(err) => write!(f, "buffer pool I/O failure: {err}"),
        }
    }
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Io(err)
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

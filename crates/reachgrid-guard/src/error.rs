//! Egress guard error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("egress IP has not been determined yet")]
    NotInitialized,

    #[error("egress IP lookup failed: {0}")]
    Lookup(String),

    #[error("lookup returned an invalid address: {0:?}")]
    InvalidAddress(String),
}

pub type GuardResult<T> = Result<T, GuardError>;

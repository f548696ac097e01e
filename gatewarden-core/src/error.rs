use thiserror::Error;

/// Raised when an address string cannot be reduced to canonical form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")]
    Empty,

    #[error("invalid address: {0:?}")]
    Invalid(String),
}

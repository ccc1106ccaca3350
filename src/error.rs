//! Error type shared across the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ResultDocError>;

/// Errors raised by the result document store.
///
/// Every variant is a programming-contract violation raised synchronously
/// to the caller; the store performs no retries and no recovery. `try_`
/// variants exist on lookups and numeric getters for expected-miss paths.
#[derive(Debug, Error)]
pub enum ResultDocError {
    /// A public operation reached a disposed document.
    #[error("result document already disposed")]
    Disposed,
    /// A typed accessor hit a row of an incompatible token kind.
    #[error("unexpected token kind: expected {expected}, found {found}")]
    WrongTokenKind {
        /// Token kind the accessor requires.
        expected: &'static str,
        /// Token kind actually stored in the row.
        found: &'static str,
    },
    /// Payload bytes do not parse as the requested representation.
    #[error("malformed {0} payload")]
    Format(&'static str),
    /// Array index beyond the element count.
    #[error("array index {index} out of range (length {len})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Array length.
        len: usize,
    },
    /// Named property lookup without a `try_` fallback found nothing.
    #[error("property not found: {0}")]
    KeyNotFound(String),
    /// Parent-chain walk exceeded the depth bound; a structural-contract
    /// violation, not user-recoverable.
    #[error("result path deeper than {0} segments")]
    PathTooDeep(usize),
    /// Invalid argument or out-of-range access at a public arena boundary.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

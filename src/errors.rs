//! Crate-wide error type.
//!
//! One flat enum, `thiserror`-derived, threaded through every fallible
//! operation with `?`. An operation either succeeds and the invariants of
//! the data model hold, or it returns one of these variants and leaves the
//! tree unchanged.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Attempted to insert a key that is already present. No state changes.
    #[error("key already present in tree")]
    InvalidInsertion,

    /// Attempted to delete a key that is not present. No state changes.
    #[error("key not present in tree")]
    InvalidDeletion,

    /// A record store location was syntactically invalid.
    #[error("invalid location: {0}")]
    InvalidLocation(LocationDebug),

    /// The tree was constructed with a degree below the minimum of 3.
    #[error("degree must be >= 3, got {0}")]
    InvalidDegree(usize),

    /// The underlying record store failed. No recovery is attempted; see
    /// the crate's concurrency notes for why this cannot be rolled back.
    #[error("record store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The record store returned a serialized node it could not decode.
    #[error("record store returned a corrupt node: {0}")]
    Corrupt(#[from] bincode::Error),
}

/// Opaque wrapper so `InvalidLocation` can carry a `Debug`-formatted
/// location of any backend-specific pointer type without the error enum
/// itself becoming generic.
#[derive(Debug)]
pub struct LocationDebug(pub String);

impl fmt::Display for LocationDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LocationDebug {
    pub fn of<T: fmt::Debug>(loc: &T) -> Self {
        LocationDebug(format!("{:?}", loc))
    }
}

//! Unified error types for sparse storage operations
//!
//! Every fallible operation in this crate returns [`StorageResult`]. The
//! variants follow how a failure is meant to be handled:
//!
//! - **Contract violations** (wrong dynamic-size count, out-of-bounds
//!   coordinates, append-order violations, cross-structure conversion) are
//!   reported at the call that detected them. They are checked before any
//!   buffer is touched wherever the check is cheap.
//! - **Unsupported combinations** (hi/lo position pairs during incremental
//!   construction) refuse with [`StorageError::NotImplemented`] instead of
//!   producing silently-wrong buffers.
//! - Capacity exhaustion is never an error; buffers grow transparently.
//!
//! # Examples
//!
//! ```
//! use tenrso_storage::error::{StorageError, StorageResult};
//!
//! fn check_rank(coords: &[usize], rank: usize) -> StorageResult<()> {
//!     if coords.len() != rank {
//!         return Err(StorageError::RankMismatch {
//!             expected: rank,
//!             got: coords.len(),
//!         });
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_rank(&[0, 1], 2).is_ok());
//! assert!(check_rank(&[0], 2).is_err());
//! ```

use thiserror::Error;

use crate::level::SchemeError;

/// Top-level error type for all storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Invalid level scheme
    #[error("Scheme error: {0}")]
    Scheme(#[from] SchemeError),

    #[error("Got wrong number of dynamic sizes: found {found}, expected {expected}")]
    DynamicSizeMismatch { expected: usize, found: usize },

    #[error("Rank mismatch: expected {expected} coordinates, got {got}")]
    RankMismatch { expected: usize, got: usize },

    #[error("Coordinate {coordinate} out of bounds at level {level} (size {size})")]
    CoordinateOutOfBounds {
        level: usize,
        coordinate: usize,
        size: usize,
    },

    #[error("Out-of-order insertion at level {level}: {reason}")]
    OutOfOrder { level: usize, reason: String },

    #[error("Length mismatch for {what}: expected {expected}, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Incompatible level schemes: {reason}")]
    IncompatibleSchemes { reason: String },

    #[error("Scheme is not a COO scheme: {reason}")]
    NotCoo { reason: String },

    #[error("Invalid slice for dimension {dim}: {reason}")]
    InvalidSlice { dim: usize, reason: String },

    #[error("Batch {batch} holds {count} entries but capacity is {capacity}")]
    CapacityExceeded {
        batch: usize,
        count: usize,
        capacity: usize,
    },

    #[error("Index {value} does not fit a {bits}-bit index type")]
    IndexOverflow { value: usize, bits: u32 },

    #[error("Value at position {position} cannot be represented in the target element type")]
    ValueCast { position: usize },

    #[error("Not yet implemented: {0}")]
    NotImplemented(String),

    #[error("Reader error: {0}")]
    Reader(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Create an out-of-order insertion error
    pub fn out_of_order(level: usize, reason: impl Into<String>) -> Self {
        StorageError::OutOfOrder {
            level,
            reason: reason.into(),
        }
    }

    /// Create an incompatible-scheme error with a message
    pub fn incompatible(reason: impl Into<String>) -> Self {
        StorageError::IncompatibleSchemes {
            reason: reason.into(),
        }
    }

    /// Create a not-COO error with a message
    pub fn not_coo(reason: impl Into<String>) -> Self {
        StorageError::NotCoo {
            reason: reason.into(),
        }
    }

    /// Create a reader error with a message
    pub fn reader(msg: impl Into<String>) -> Self {
        StorageError::Reader(msg.into())
    }

    /// Returns true for failures caused by the caller breaking an operation's contract
    ///
    /// A zero-sized dimension only reaches this type through a dynamic size
    /// passed at allocation; static zero sizes are rejected when the scheme
    /// is built.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            StorageError::DynamicSizeMismatch { .. }
                | StorageError::Scheme(SchemeError::ZeroSize(_))
                | StorageError::RankMismatch { .. }
                | StorageError::CoordinateOutOfBounds { .. }
                | StorageError::OutOfOrder { .. }
                | StorageError::LengthMismatch { .. }
                | StorageError::IncompatibleSchemes { .. }
                | StorageError::NotCoo { .. }
                | StorageError::InvalidSlice { .. }
                | StorageError::CapacityExceeded { .. }
        )
    }
}

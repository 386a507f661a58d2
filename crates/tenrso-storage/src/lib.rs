//! # tenrso-storage
//!
//! Level-format sparse tensor storage for TenRSo.
//!
//! A tensor of rank `n` is stored as `n` levels, each independently dense,
//! compressed or singleton, with a permutation between logical dimensions and
//! physical levels. CSR, CSC, DCSR and COO are all special cases.
//!
//! This crate provides:
//! - Level schemes: level types, qualifiers and dimension ordering
//! - Storage instances: position/coordinate/value buffers plus a specifier
//! - Ordered insertion with finalization
//! - Bulk row construction via expand/compress
//! - Pack/unpack of flat COO lists (including batched layouts)
//! - Width conversion and zero-copy slice views
//! - Loading from coordinate readers (Matrix Market included)
//!
//! # Examples
//!
//! ```
//! use tenrso_storage::{DimSize, LevelScheme, SparseStorage};
//!
//! let scheme = LevelScheme::dcsr(DimSize::Static(4), DimSize::Static(4));
//! let mut m = SparseStorage::<f64>::allocate(scheme, &[], Some(2)).unwrap();
//! m.insert(&[1, 3], 2.0).unwrap();
//! m.insert(&[3, 0], 5.0).unwrap();
//! m.finalize().unwrap();
//!
//! assert_eq!(m.coordinates(0).to_vec(), vec![1, 3]);
//! assert_eq!(m.positions(1), &[0, 1, 2]);
//! ```

#![deny(warnings)]

pub mod buffers;
pub mod config;
pub mod convert;
pub mod error;
pub mod expand;
pub mod index;
pub mod insert;
pub mod level;
#[cfg(feature = "subscriber")]
pub mod logging;
pub mod matrix_market;
pub mod pack;
pub mod reader;
pub mod specifier;
pub mod storage;

// Re-exports
pub use buffers::{CoordinateView, StorageBuffers};
pub use config::StorageConfig;
pub use error::{StorageError, StorageResult};
pub use expand::ExpandedAccess;
pub use index::IndexType;
pub use level::{DimSize, LevelFormat, LevelScheme, LevelType, SchemeError};
pub use matrix_market::{write_matrix_market, MatrixMarketHeader, MatrixMarketReader};
pub use pack::Unpacked;
pub use reader::{sort_coo, CooReader, InMemoryReader};
pub use specifier::{DimSlice, StorageSpecifier};
pub use storage::{OwnedStorage, SparseStorage};

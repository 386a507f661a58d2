//! Level schemes: per-level formats and the dimension-to-level ordering
//!
//! A sparse tensor of rank `n` is stored as `n` physical levels. Each level is
//! independently dense, compressed or singleton, and a permutation maps the
//! tensor's logical dimensions onto those levels. Classic 2-D formats are
//! special cases:
//!
//! | Format | Levels                                   | `dim_to_lvl` |
//! |--------|------------------------------------------|--------------|
//! | CSR    | `dense, compressed`                      | `[0, 1]`     |
//! | CSC    | `dense, compressed`                      | `[1, 0]`     |
//! | DCSR   | `compressed, compressed`                 | `[0, 1]`     |
//! | COO    | `compressed-nu, singleton`               | `[0, 1]`     |
//!
//! # Examples
//!
//! ```
//! use tenrso_storage::level::{DimSize, LevelScheme, LevelType};
//!
//! let csr = LevelScheme::csr(DimSize::Static(3), DimSize::Dynamic);
//! assert_eq!(csr.lvl_rank(), 2);
//! assert_eq!(csr.num_dynamic_dims(), 1);
//! assert!(csr.is_compressed_lvl(1));
//!
//! let lt: LevelType = "compressed-nu".parse().unwrap();
//! assert!(!lt.is_unique());
//! assert_eq!(lt.to_string(), "compressed-nu");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{StorageError, StorageResult};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemeError {
    #[error("Scheme must have at least one level")]
    EmptyScheme,

    #[error("Level count {levels} does not match dimension count {dims}")]
    RankMismatch { levels: usize, dims: usize },

    #[error("dim_to_lvl {0:?} is not a permutation")]
    InvalidPermutation(Vec<usize>),

    #[error("Static size of dimension {0} cannot be zero")]
    ZeroSize(usize),

    #[error("Dense levels are always ordered and unique")]
    QualifiedDense,

    #[error("Unknown level type: {0}")]
    UnknownLevelType(String),
}

/// Storage format of a single level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelFormat {
    /// Every coordinate in `0..size` is implicitly stored
    Dense,
    /// Positions bound each parent's child range, coordinates list the children
    Compressed,
    /// Like `Compressed`, but every parent owns a (lo, hi) position pair
    CompressedWithHi,
    /// Exactly one child per parent; coordinates only, no positions
    Singleton,
}

/// Format of one level together with its ordering/uniqueness qualifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelType {
    format: LevelFormat,
    ordered: bool,
    unique: bool,
}

impl LevelType {
    pub const DENSE: LevelType = LevelType {
        format: LevelFormat::Dense,
        ordered: true,
        unique: true,
    };

    pub const COMPRESSED: LevelType = LevelType {
        format: LevelFormat::Compressed,
        ordered: true,
        unique: true,
    };

    pub const SINGLETON: LevelType = LevelType {
        format: LevelFormat::Singleton,
        ordered: true,
        unique: true,
    };

    /// Create a level type, rejecting qualified dense levels
    pub fn new(format: LevelFormat, ordered: bool, unique: bool) -> Result<Self, SchemeError> {
        if format == LevelFormat::Dense && !(ordered && unique) {
            return Err(SchemeError::QualifiedDense);
        }
        Ok(Self {
            format,
            ordered,
            unique,
        })
    }

    pub fn compressed(ordered: bool, unique: bool) -> Self {
        Self {
            format: LevelFormat::Compressed,
            ordered,
            unique,
        }
    }

    pub fn compressed_with_hi(ordered: bool, unique: bool) -> Self {
        Self {
            format: LevelFormat::CompressedWithHi,
            ordered,
            unique,
        }
    }

    pub fn singleton(ordered: bool, unique: bool) -> Self {
        Self {
            format: LevelFormat::Singleton,
            ordered,
            unique,
        }
    }

    #[inline]
    pub fn format(&self) -> LevelFormat {
        self.format
    }

    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    #[inline]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    #[inline]
    pub fn is_dense(&self) -> bool {
        self.format == LevelFormat::Dense
    }

    #[inline]
    pub fn is_compressed(&self) -> bool {
        self.format == LevelFormat::Compressed
    }

    #[inline]
    pub fn is_compressed_with_hi(&self) -> bool {
        self.format == LevelFormat::CompressedWithHi
    }

    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.format == LevelFormat::Singleton
    }

    /// True for both position encodings
    #[inline]
    pub fn has_positions(&self) -> bool {
        matches!(
            self.format,
            LevelFormat::Compressed | LevelFormat::CompressedWithHi
        )
    }
}

impl fmt::Display for LevelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.format {
            LevelFormat::Dense => return f.write_str("dense"),
            LevelFormat::Compressed => "compressed",
            LevelFormat::CompressedWithHi => "compressed-hi",
            LevelFormat::Singleton => "singleton",
        };
        f.write_str(base)?;
        if !self.unique {
            f.write_str("-nu")?;
        }
        if !self.ordered {
            f.write_str("-no")?;
        }
        Ok(())
    }
}

impl FromStr for LevelType {
    type Err = SchemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let (format, rest) = if let Some(rest) = lowered.strip_prefix("compressed-hi") {
            (LevelFormat::CompressedWithHi, rest)
        } else if let Some(rest) = lowered.strip_prefix("compressed") {
            (LevelFormat::Compressed, rest)
        } else if let Some(rest) = lowered.strip_prefix("singleton") {
            (LevelFormat::Singleton, rest)
        } else if lowered == "dense" {
            return Ok(LevelType::DENSE);
        } else {
            return Err(SchemeError::UnknownLevelType(s.to_string()));
        };

        let (mut ordered, mut unique) = (true, true);
        for qualifier in rest.split('-').filter(|q| !q.is_empty()) {
            match qualifier {
                "nu" if unique => unique = false,
                "no" if ordered => ordered = false,
                _ => return Err(SchemeError::UnknownLevelType(s.to_string())),
            }
        }
        LevelType::new(format, ordered, unique)
    }
}

/// Declared size of one logical dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimSize {
    Static(usize),
    /// Resolved from caller-supplied sizes when storage is created
    Dynamic,
}

impl DimSize {
    #[inline]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, DimSize::Dynamic)
    }

    #[inline]
    pub fn as_static(&self) -> Option<usize> {
        match self {
            DimSize::Static(sz) => Some(*sz),
            DimSize::Dynamic => None,
        }
    }
}

/// Static description of a sparse tensor's storage layout
///
/// Pure data: level types, the dimension-to-level permutation and the
/// declared dimension sizes. A scheme never changes once built; every query
/// on it is total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SchemeDesc", into = "SchemeDesc")]
pub struct LevelScheme {
    lvl_types: Vec<LevelType>,
    /// `dim_to_lvl[d]` is the level storing dimension `d`
    dim_to_lvl: Vec<usize>,
    lvl_to_dim: Vec<usize>,
    dim_shape: Vec<DimSize>,
}

#[derive(Serialize, Deserialize)]
struct SchemeDesc {
    levels: Vec<LevelType>,
    #[serde(default)]
    dim_to_lvl: Option<Vec<usize>>,
    dims: Vec<DimSize>,
}

impl TryFrom<SchemeDesc> for LevelScheme {
    type Error = SchemeError;

    fn try_from(desc: SchemeDesc) -> Result<Self, Self::Error> {
        let dim_to_lvl = desc
            .dim_to_lvl
            .unwrap_or_else(|| (0..desc.dims.len()).collect());
        LevelScheme::new(desc.levels, dim_to_lvl, desc.dims)
    }
}

impl From<LevelScheme> for SchemeDesc {
    fn from(scheme: LevelScheme) -> Self {
        SchemeDesc {
            levels: scheme.lvl_types,
            dim_to_lvl: Some(scheme.dim_to_lvl),
            dims: scheme.dim_shape,
        }
    }
}

impl LevelScheme {
    /// Creates a scheme from level types, a dimension-to-level permutation and dimension sizes.
    ///
    /// # Errors
    ///
    /// - the scheme has no levels
    /// - level, permutation and dimension counts disagree
    /// - `dim_to_lvl` is not a permutation of `0..rank`
    /// - a static dimension size is zero
    pub fn new(
        lvl_types: Vec<LevelType>,
        dim_to_lvl: Vec<usize>,
        dim_shape: Vec<DimSize>,
    ) -> Result<Self, SchemeError> {
        if lvl_types.is_empty() {
            return Err(SchemeError::EmptyScheme);
        }
        if lvl_types.len() != dim_shape.len() || dim_to_lvl.len() != dim_shape.len() {
            return Err(SchemeError::RankMismatch {
                levels: lvl_types.len(),
                dims: dim_shape.len(),
            });
        }

        if lvl_types
            .iter()
            .any(|lt| lt.is_dense() && !(lt.ordered && lt.unique))
        {
            return Err(SchemeError::QualifiedDense);
        }

        let rank = lvl_types.len();
        let mut lvl_to_dim = vec![usize::MAX; rank];
        for (d, &l) in dim_to_lvl.iter().enumerate() {
            if l >= rank || lvl_to_dim[l] != usize::MAX {
                return Err(SchemeError::InvalidPermutation(dim_to_lvl));
            }
            lvl_to_dim[l] = d;
        }

        if let Some(d) = dim_shape.iter().position(|s| *s == DimSize::Static(0)) {
            return Err(SchemeError::ZeroSize(d));
        }

        Ok(Self {
            lvl_types,
            dim_to_lvl,
            lvl_to_dim,
            dim_shape,
        })
    }

    /// Creates a scheme whose levels store dimensions in their natural order
    pub fn identity(
        lvl_types: Vec<LevelType>,
        dim_shape: Vec<DimSize>,
    ) -> Result<Self, SchemeError> {
        let dim_to_lvl = (0..dim_shape.len()).collect();
        Self::new(lvl_types, dim_to_lvl, dim_shape)
    }

    /// All-dense scheme in row-major order
    pub fn dense(dim_shape: Vec<DimSize>) -> Result<Self, SchemeError> {
        Self::identity(vec![LevelType::DENSE; dim_shape.len()], dim_shape)
    }

    /// Compressed sparse rows: `dense, compressed`
    pub fn csr(rows: DimSize, cols: DimSize) -> Self {
        Self::two_level(LevelType::DENSE, LevelType::COMPRESSED, [0, 1], rows, cols)
    }

    /// Compressed sparse columns: `dense, compressed` with columns stored first
    pub fn csc(rows: DimSize, cols: DimSize) -> Self {
        Self::two_level(LevelType::DENSE, LevelType::COMPRESSED, [1, 0], rows, cols)
    }

    /// Doubly compressed sparse rows: `compressed, compressed`
    pub fn dcsr(rows: DimSize, cols: DimSize) -> Self {
        Self::two_level(LevelType::COMPRESSED, LevelType::COMPRESSED, [0, 1], rows, cols)
    }

    /// Ordered COO: `compressed-nu, singleton-nu, ..., singleton`
    ///
    /// A rank-1 COO scheme is a single unique compressed level.
    pub fn coo(dim_shape: Vec<DimSize>) -> Result<Self, SchemeError> {
        let rank = dim_shape.len();
        let lvl_types = (0..rank)
            .map(|l| {
                let last = l + 1 == rank;
                if l == 0 {
                    LevelType::compressed(true, last)
                } else {
                    LevelType::singleton(true, last)
                }
            })
            .collect();
        Self::identity(lvl_types, dim_shape)
    }

    /// COO with `batch` leading dense levels followed by an ordered COO region
    pub fn batched_coo(batch: Vec<DimSize>, coo: Vec<DimSize>) -> Result<Self, SchemeError> {
        let rank = coo.len();
        let mut lvl_types = vec![LevelType::DENSE; batch.len()];
        lvl_types.extend((0..rank).map(|l| {
            let last = l + 1 == rank;
            if l == 0 {
                LevelType::compressed(true, last)
            } else {
                LevelType::singleton(true, last)
            }
        }));
        let mut dims = batch;
        dims.extend(coo);
        Self::identity(lvl_types, dims)
    }

    fn two_level(
        l0: LevelType,
        l1: LevelType,
        dim_to_lvl: [usize; 2],
        rows: DimSize,
        cols: DimSize,
    ) -> Self {
        let lvl_to_dim = if dim_to_lvl == [0, 1] { vec![0, 1] } else { vec![1, 0] };
        Self {
            lvl_types: vec![l0, l1],
            dim_to_lvl: dim_to_lvl.to_vec(),
            lvl_to_dim,
            dim_shape: vec![rows, cols],
        }
    }

    #[inline]
    pub fn lvl_rank(&self) -> usize {
        self.lvl_types.len()
    }

    #[inline]
    pub fn dim_rank(&self) -> usize {
        self.dim_shape.len()
    }

    #[inline]
    pub fn lvl_types(&self) -> &[LevelType] {
        &self.lvl_types
    }

    #[inline]
    pub fn lvl_type(&self, lvl: usize) -> LevelType {
        self.lvl_types[lvl]
    }

    #[inline]
    pub fn dim_to_lvl(&self) -> &[usize] {
        &self.dim_to_lvl
    }

    #[inline]
    pub fn to_lvl(&self, dim: usize) -> usize {
        self.dim_to_lvl[dim]
    }

    #[inline]
    pub fn to_dim(&self, lvl: usize) -> usize {
        self.lvl_to_dim[lvl]
    }

    #[inline]
    pub fn dim_shape(&self) -> &[DimSize] {
        &self.dim_shape
    }

    pub fn is_identity(&self) -> bool {
        self.dim_to_lvl.iter().enumerate().all(|(d, &l)| d == l)
    }

    pub fn num_dynamic_dims(&self) -> usize {
        self.dim_shape.iter().filter(|s| s.is_dynamic()).count()
    }

    pub fn static_dim_size(&self, dim: usize) -> Option<usize> {
        self.dim_shape[dim].as_static()
    }

    pub fn is_all_dense(&self) -> bool {
        self.lvl_types.iter().all(LevelType::is_dense)
    }

    #[inline]
    pub fn is_dense_lvl(&self, lvl: usize) -> bool {
        self.lvl_types[lvl].is_dense()
    }

    #[inline]
    pub fn is_compressed_lvl(&self, lvl: usize) -> bool {
        self.lvl_types[lvl].is_compressed()
    }

    #[inline]
    pub fn is_compressed_with_hi_lvl(&self, lvl: usize) -> bool {
        self.lvl_types[lvl].is_compressed_with_hi()
    }

    #[inline]
    pub fn is_singleton_lvl(&self, lvl: usize) -> bool {
        self.lvl_types[lvl].is_singleton()
    }

    #[inline]
    pub fn is_ordered_level(&self, lvl: usize) -> bool {
        self.lvl_types[lvl].is_ordered()
    }

    #[inline]
    pub fn is_unique_level(&self, lvl: usize) -> bool {
        self.lvl_types[lvl].is_unique()
    }

    /// True iff level `start` is compressed (either position encoding), every
    /// later level is singleton, and, when `require_unique` is set, the last
    /// level is unique.
    pub fn is_coo_shape(&self, start: usize, require_unique: bool) -> bool {
        let rank = self.lvl_rank();
        if start >= rank || !self.lvl_types[start].has_positions() {
            return false;
        }
        if !self.lvl_types[start + 1..].iter().all(LevelType::is_singleton) {
            return false;
        }
        !require_unique || self.is_unique_level(rank - 1)
    }

    /// Ordered COO from level 0: a unique COO shape whose levels are all ordered
    pub fn is_ordered_coo(&self) -> bool {
        self.is_coo_shape(0, true) && self.lvl_types.iter().all(LevelType::is_ordered)
    }

    /// First level of the trailing COO region that shares one array-of-structures
    /// coordinate buffer, or `lvl_rank()` if there is none.
    ///
    /// Only regions spanning at least two levels count.
    pub fn coo_start(&self) -> usize {
        let rank = self.lvl_rank();
        if rank > 1 {
            for l in 0..rank - 1 {
                if self.is_coo_shape(l, false) {
                    return l;
                }
            }
        }
        rank
    }

    /// Number of leading dense levels
    pub fn leading_dense_levels(&self) -> usize {
        self.lvl_types.iter().take_while(|lt| lt.is_dense()).count()
    }

    /// Locates the coordinates of level `lvl`: the level owning the buffer,
    /// the interleaving stride and the offset within each stride.
    pub fn crd_location(&self, lvl: usize) -> (usize, usize, usize) {
        let coo_start = self.coo_start();
        if lvl >= coo_start {
            (coo_start, self.lvl_rank() - coo_start, lvl - coo_start)
        } else {
            (lvl, 1, 0)
        }
    }

    /// True if level `lvl` owns a coordinate buffer of its own
    pub fn owns_crd_buffer(&self, lvl: usize) -> bool {
        !self.is_dense_lvl(lvl) && lvl <= self.coo_start()
    }

    /// True if `other` stores the same tensor type with the same level structure
    pub fn same_structure(&self, other: &LevelScheme) -> bool {
        self.lvl_types == other.lvl_types
            && self.dim_to_lvl == other.dim_to_lvl
            && self.dim_shape == other.dim_shape
    }

    /// Resolves every dimension size, taking dynamic ones from `dyn_sizes` in order
    pub fn resolve_dim_sizes(&self, dyn_sizes: &[usize]) -> StorageResult<Vec<usize>> {
        let expected = self.num_dynamic_dims();
        if dyn_sizes.len() != expected {
            return Err(StorageError::DynamicSizeMismatch {
                expected,
                found: dyn_sizes.len(),
            });
        }

        let mut next = dyn_sizes.iter();
        let mut sizes = Vec::with_capacity(self.dim_rank());
        for (d, shape) in self.dim_shape.iter().enumerate() {
            let sz = match shape {
                DimSize::Static(sz) => *sz,
                DimSize::Dynamic => next.next().copied().unwrap_or_default(),
            };
            if sz == 0 {
                return Err(SchemeError::ZeroSize(d).into());
            }
            sizes.push(sz);
        }
        Ok(sizes)
    }

    /// Level sizes for the given resolved dimension sizes
    pub fn lvl_sizes_from_dims(&self, dim_sizes: &[usize]) -> Vec<usize> {
        self.lvl_to_dim.iter().map(|&d| dim_sizes[d]).collect()
    }
}

impl fmt::Display for LevelScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (l, lt) in self.lvl_types.iter().enumerate() {
            if l > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", lt)?;
        }
        write!(f, "] dim_to_lvl={:?}", self.dim_to_lvl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(n: usize) -> DimSize {
        DimSize::Static(n)
    }

    #[test]
    fn test_level_type_parse_roundtrip() {
        for text in [
            "dense",
            "compressed",
            "compressed-nu",
            "compressed-no",
            "compressed-nu-no",
            "compressed-hi-nu",
            "singleton",
            "singleton-nu-no",
        ] {
            let lt: LevelType = text.parse().unwrap();
            assert_eq!(lt.to_string(), text);
        }
        assert!("dense-nu".parse::<LevelType>().is_err());
        assert!("compressed-nu-nu".parse::<LevelType>().is_err());
        assert!("sparse".parse::<LevelType>().is_err());
    }

    #[test]
    fn test_qualified_dense_rejected() {
        assert_eq!(
            LevelType::new(LevelFormat::Dense, true, false),
            Err(SchemeError::QualifiedDense)
        );
    }

    #[test]
    fn test_invalid_permutation() {
        let lts = vec![LevelType::DENSE, LevelType::COMPRESSED];
        let err = LevelScheme::new(lts.clone(), vec![0, 0], vec![s(2), s(2)]).unwrap_err();
        assert!(matches!(err, SchemeError::InvalidPermutation(_)));
        let err = LevelScheme::new(lts, vec![0, 2], vec![s(2), s(2)]).unwrap_err();
        assert!(matches!(err, SchemeError::InvalidPermutation(_)));
    }

    #[test]
    fn test_csc_mapping() {
        let csc = LevelScheme::csc(s(3), s(5));
        assert_eq!(csc.to_lvl(1), 0);
        assert_eq!(csc.to_dim(0), 1);
        assert_eq!(csc.lvl_sizes_from_dims(&[3, 5]), vec![5, 3]);
        assert!(!csc.is_identity());
    }

    #[test]
    fn test_all_dense() {
        let dense = LevelScheme::dense(vec![s(2), s(3)]).unwrap();
        assert!(dense.is_all_dense());
        assert!(!LevelScheme::csr(s(2), s(3)).is_all_dense());
    }

    #[test]
    fn test_coo_shape_queries() {
        let coo = LevelScheme::coo(vec![s(4), s(4), s(4)]).unwrap();
        assert!(coo.is_coo_shape(0, true));
        assert!(coo.is_ordered_coo());
        assert_eq!(coo.coo_start(), 0);
        assert_eq!(coo.crd_location(2), (0, 3, 2));
        assert!(coo.owns_crd_buffer(0));
        assert!(!coo.owns_crd_buffer(1));

        let csr = LevelScheme::csr(s(4), s(4));
        assert!(!csr.is_coo_shape(0, false));
        assert!(csr.is_coo_shape(1, true));
        // Single-level regions do not use array-of-structures storage.
        assert_eq!(csr.coo_start(), 2);
        assert_eq!(csr.crd_location(1), (1, 1, 0));

        let batched = LevelScheme::batched_coo(vec![s(2)], vec![s(4), s(4)]).unwrap();
        assert_eq!(batched.coo_start(), 1);
        assert_eq!(batched.leading_dense_levels(), 1);
        assert!(batched.is_coo_shape(1, true));
    }

    #[test]
    fn test_non_unique_tail_is_not_unique_coo() {
        let lts = vec![LevelType::compressed(true, false), LevelType::singleton(true, false)];
        let scheme = LevelScheme::identity(lts, vec![s(3), s(3)]).unwrap();
        assert!(scheme.is_coo_shape(0, false));
        assert!(!scheme.is_coo_shape(0, true));
    }

    #[test]
    fn test_resolve_dynamic_sizes() {
        let csr = LevelScheme::csr(DimSize::Dynamic, s(7));
        assert_eq!(csr.resolve_dim_sizes(&[4]).unwrap(), vec![4, 7]);
        let err = csr.resolve_dim_sizes(&[]).unwrap_err();
        assert!(matches!(
            err,
            StorageError::DynamicSizeMismatch {
                expected: 1,
                found: 0
            }
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let scheme = LevelScheme::csc(s(3), DimSize::Dynamic);
        let json = serde_json::to_string(&scheme).unwrap();
        let back: LevelScheme = serde_json::from_str(&json).unwrap();
        assert_eq!(scheme, back);

        let bad = concat!(
            r#"{"levels":[{"format":"dense","ordered":true,"unique":true}],"#,
            r#""dim_to_lvl":[1],"dims":[{"static":2}]}"#
        );
        assert!(serde_json::from_str::<LevelScheme>(bad).is_err());
    }
}

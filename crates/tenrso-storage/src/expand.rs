//! Bulk row construction through a dense accumulator
//!
//! When a whole innermost row arrives out of order, possibly with duplicates,
//! inserting element by element would violate the append discipline. Instead:
//!
//! 1. [`SparseStorage::expand`] creates an [`ExpandedAccess`]: dense scratch
//!    sized to the innermost level.
//! 2. The caller scatters `(coordinate, value)` pairs into it, folding
//!    duplicates with a reduction of its choice.
//! 3. [`SparseStorage::compress`] inserts the touched coordinates of one row
//!    (sorted when the innermost level is ordered) and resets the scratch, so
//!    the same access can be reused for the next row.
//!
//! # Examples
//!
//! ```
//! use tenrso_storage::{DimSize, LevelScheme, SparseStorage};
//!
//! let scheme = LevelScheme::csr(DimSize::Static(2), DimSize::Static(5));
//! let mut csr = SparseStorage::<f64>::allocate(scheme, &[], None).unwrap();
//! let mut access = csr.expand();
//!
//! access.add(4, 1.0).unwrap();
//! access.add(0, 2.0).unwrap();
//! access.add(4, 0.5).unwrap();
//! csr.compress(&[0], &mut access).unwrap();
//! csr.finalize().unwrap();
//!
//! assert_eq!(csr.coordinates(1).to_vec(), vec![0, 4]);
//! assert_eq!(csr.values(), &[2.0, 1.5]);
//! assert_eq!(access.count(), 0);
//! ```

use scirs2_core::numeric::Num;

use crate::error::{StorageError, StorageResult};
use crate::index::IndexType;
use crate::storage::SparseStorage;

/// Dense scratch buffers for one innermost row
#[derive(Debug, Clone)]
pub struct ExpandedAccess<T> {
    level: usize,
    values: Vec<T>,
    filled: Vec<bool>,
    added: Vec<usize>,
}

impl<T: Num + Copy> ExpandedAccess<T> {
    /// Scratch for innermost level `level` of the given size
    pub fn new(level: usize, size: usize) -> Self {
        Self {
            level,
            values: vec![T::zero(); size],
            filled: vec![false; size],
            added: Vec::new(),
        }
    }

    /// Extent of the innermost level
    #[inline]
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Number of distinct coordinates touched since the last compress
    #[inline]
    pub fn count(&self) -> usize {
        self.added.len()
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    #[inline]
    pub fn filled(&self) -> &[bool] {
        &self.filled
    }

    /// Touched coordinates, in first-touch order
    #[inline]
    pub fn added(&self) -> &[usize] {
        &self.added
    }

    /// Scatters `value` at `coord`, folding it into an existing one with `reduce`
    pub fn accumulate<F>(&mut self, coord: usize, value: T, reduce: F) -> StorageResult<()>
    where
        F: FnOnce(T, T) -> T,
    {
        if coord >= self.values.len() {
            return Err(StorageError::CoordinateOutOfBounds {
                level: self.level,
                coordinate: coord,
                size: self.values.len(),
            });
        }
        if self.filled[coord] {
            self.values[coord] = reduce(self.values[coord], value);
        } else {
            self.filled[coord] = true;
            self.added.push(coord);
            self.values[coord] = value;
        }
        Ok(())
    }

    /// Scatters `value` at `coord`, summing duplicates
    pub fn add(&mut self, coord: usize, value: T) -> StorageResult<()> {
        self.accumulate(coord, value, |a, b| a + b)
    }

    /// Clears the touched entries and the touched list
    fn reset(&mut self) {
        for &c in &self.added {
            self.values[c] = T::zero();
            self.filled[c] = false;
        }
        self.added.clear();
    }
}

impl<'a, T, P, C> SparseStorage<'a, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Creates dense scratch sized to the innermost level
    pub fn expand(&self) -> ExpandedAccess<T> {
        let level = self.lvl_rank() - 1;
        ExpandedAccess::new(level, self.lvl_size(level))
    }

    /// Inserts every touched coordinate of `access` under the row `prefix`.
    ///
    /// `prefix` holds the level coordinates of every level but the innermost.
    /// Coordinates are inserted in ascending order when the innermost level is
    /// ordered, otherwise in first-touch order. The scratch is reset
    /// afterwards.
    ///
    /// # Errors
    ///
    /// The whole row is validated before the first insertion: prefix rank and
    /// bounds, append order, and room in both index types for every entry of
    /// the row. On error nothing is inserted and the scratch keeps its
    /// entries.
    pub fn compress(
        &mut self,
        prefix: &[usize],
        access: &mut ExpandedAccess<T>,
    ) -> StorageResult<()> {
        let rank = self.lvl_rank();
        if prefix.len() + 1 != rank {
            return Err(StorageError::RankMismatch {
                expected: rank - 1,
                got: prefix.len(),
            });
        }
        if access.size() != self.lvl_size(rank - 1) {
            return Err(StorageError::LengthMismatch {
                what: "expanded access",
                expected: self.lvl_size(rank - 1),
                got: access.size(),
            });
        }

        if self.scheme.is_ordered_level(rank - 1) {
            access.added.sort_unstable();
        }

        let Some(&head) = access.added.first() else {
            return Ok(());
        };
        let mut coords = Vec::with_capacity(rank);
        coords.extend_from_slice(prefix);
        coords.push(head);
        let mut narrowed = self.check_coordinates(&coords)?;
        let tail = access
            .added
            .iter()
            .skip(1)
            .map(|&c| C::from_index(c))
            .collect::<StorageResult<Vec<C>>>()?;

        // The head may reopen the prefix; later entries share it and append
        // from the first level that never reports a present child.
        let first = self.first_appending_level(&coords)?;
        let repeat = self.repeat_appending_level();
        for l in 0..rank {
            let appended = usize::from(first.is_some_and(|f| l >= f))
                + if l >= repeat { tail.len() } else { 0 };
            self.check_append_room(l, appended)?;
        }

        self.write_tuple(&coords, &narrowed, access.values[head])?;
        for (&c, n) in access.added[1..].iter().zip(tail) {
            coords[rank - 1] = c;
            narrowed[rank - 1] = n;
            self.write_tuple(&coords, &narrowed, access.values[c])?;
        }
        access.reset();
        Ok(())
    }
}

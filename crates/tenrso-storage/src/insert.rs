//! Ordered insertion and finalization
//!
//! Entries are inserted one full coordinate tuple at a time. The walk keeps a
//! running parent position: dense levels compose it row-major, compressed
//! levels resolve or append a child under it, singleton levels append and
//! carry it forward.
//!
//! Insertion is an append discipline, not a general membership test. Only the
//! most recent child of a parent is checked for a duplicate, so children of
//! one parent must arrive contiguously. Violations that can be detected from
//! the tail of a range are reported as [`StorageError::OutOfOrder`]; revisiting
//! a parent whose range was never opened is not detected.

use scirs2_core::numeric::Num;

use crate::error::{StorageError, StorageResult};
use crate::index::IndexType;
use crate::level::LevelFormat;
use crate::storage::SparseStorage;

impl<'a, T, P, C> SparseStorage<'a, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Inserts `value` at the level-ordered coordinates `lvl_coords`.
    ///
    /// For a unique compressed last level, inserting a tuple equal to the
    /// previously inserted one overwrites the stored value. Non-unique levels
    /// always append.
    ///
    /// # Errors
    ///
    /// - wrong number of coordinates, or a coordinate beyond its level size
    /// - a coordinate or an appended position that does not fit the index type
    /// - a detectable append-order violation
    /// - hi/lo position levels
    ///
    /// All of these are reported before any buffer is modified.
    pub fn insert(&mut self, lvl_coords: &[usize], value: T) -> StorageResult<()> {
        let narrowed = self.check_coordinates(lvl_coords)?;
        if let Some(first) = self.first_appending_level(lvl_coords)? {
            for l in first..self.lvl_rank() {
                self.check_append_room(l, 1)?;
            }
        }
        self.write_tuple(lvl_coords, &narrowed, value)
    }

    /// Inserts `value` at dimension-ordered coordinates
    pub fn insert_dims(&mut self, dim_coords: &[usize], value: T) -> StorageResult<()> {
        if dim_coords.len() != self.dim_rank() {
            return Err(StorageError::RankMismatch {
                expected: self.dim_rank(),
                got: dim_coords.len(),
            });
        }
        let mut lvl_coords = vec![0; self.lvl_rank()];
        for (d, &c) in dim_coords.iter().enumerate() {
            lvl_coords[self.scheme.to_lvl(d)] = c;
        }
        self.insert(&lvl_coords, value)
    }

    /// Runs the level walk for a tuple that already passed every check.
    ///
    /// `narrowed` holds `lvl_coords` converted to the coordinate type. The
    /// position stores and range allocations cannot fail once
    /// [`Self::check_append_room`] accepted every appending level.
    pub(crate) fn write_tuple(
        &mut self,
        lvl_coords: &[usize],
        narrowed: &[C],
        value: T,
    ) -> StorageResult<()> {
        let rank = self.lvl_rank();
        let coo_start = self.scheme.coo_start();
        let mut parent = 0usize;
        let mut reused = false;
        for (l, &c) in lvl_coords.iter().enumerate() {
            let lt = self.scheme.lvl_type(l);
            match lt.format() {
                LevelFormat::Dense => {
                    parent = self.specifier.lvl_size(l) * parent + c;
                    reused = false;
                }
                LevelFormat::Singleton => {
                    self.push_coordinate(l, narrowed[l]);
                    reused = false;
                }
                LevelFormat::Compressed => {
                    let pstart = self.position_at(l, parent);
                    let pstop = self.position_at(l, parent + 1);
                    let present = pstart < pstop
                        && lt.is_unique()
                        && l < coo_start
                        && self.coordinate_at(l, pstop - 1) == c;
                    if present {
                        parent = pstop - 1;
                        reused = true;
                        continue;
                    }

                    let msz = self.crd_count(l);
                    if pstart >= pstop && l > 0 {
                        self.store_position(l, parent, msz)?;
                    }
                    self.push_coordinate(l, narrowed[l]);
                    self.store_position(l, parent + 1, msz + 1)?;
                    parent = msz;
                    reused = false;
                    if l + 1 < rank {
                        self.alloc_scheme_for_rank(l + 1)?;
                    }
                }
                // Rejected by check_coordinates
                LevelFormat::CompressedWithHi => {}
            }
        }

        if reused || self.scheme.is_dense_lvl(rank - 1) {
            self.buffers.values.to_mut()[parent] = value;
        } else {
            self.push_value(value, 1);
        }
        Ok(())
    }

    /// Checks rank, level bounds and level formats of a tuple, and narrows
    /// it to the coordinate type.
    pub(crate) fn check_coordinates(&self, lvl_coords: &[usize]) -> StorageResult<Vec<C>> {
        let rank = self.lvl_rank();
        if lvl_coords.len() != rank {
            return Err(StorageError::RankMismatch {
                expected: rank,
                got: lvl_coords.len(),
            });
        }
        for (l, &c) in lvl_coords.iter().enumerate() {
            let size = self.specifier.lvl_size(l);
            if c >= size {
                return Err(StorageError::CoordinateOutOfBounds {
                    level: l,
                    coordinate: c,
                    size,
                });
            }
        }
        if let Some(l) = (0..rank).find(|&l| self.scheme.is_compressed_with_hi_lvl(l)) {
            return Err(StorageError::NotImplemented(format!(
                "inserting into hi/lo position level {}",
                l
            )));
        }
        lvl_coords.iter().map(|&c| C::from_index(c)).collect()
    }

    /// Replays the level walk read-only and returns the first compressed
    /// level that would append, or `None` when the tuple overwrites.
    ///
    /// Every level below the returned one starts from a fresh empty range.
    pub(crate) fn first_appending_level(
        &self,
        lvl_coords: &[usize],
    ) -> StorageResult<Option<usize>> {
        let coo_start = self.scheme.coo_start();
        let mut parent = 0usize;
        for (l, &c) in lvl_coords.iter().enumerate() {
            let lt = self.scheme.lvl_type(l);
            if lt.is_dense() {
                parent = self.specifier.lvl_size(l) * parent + c;
                continue;
            }
            if !lt.is_compressed() {
                continue;
            }
            let pstart = self.position_at(l, parent);
            let pstop = self.position_at(l, parent + 1);
            if pstart >= pstop {
                return Ok(Some(l));
            }
            let last = self.coordinate_at(l, pstop - 1);
            if lt.is_unique() && l < coo_start && last == c {
                parent = pstop - 1;
                continue;
            }
            if pstop != self.crd_count(l) {
                return Err(StorageError::out_of_order(
                    l,
                    format!("range of parent {} is not the most recently appended", parent),
                ));
            }
            if lt.is_ordered() && c < last {
                return Err(StorageError::out_of_order(
                    l,
                    format!("coordinate {} after {}", c, last),
                ));
            }
            return Ok(Some(l));
        }
        Ok(None)
    }

    /// First level that appends again for every further tuple sharing the
    /// prefix of the one just written. Levels above it report the prefix as
    /// present.
    pub(crate) fn repeat_appending_level(&self) -> usize {
        let rank = self.lvl_rank();
        let coo_start = self.scheme.coo_start();
        (0..rank - 1)
            .find(|&l| {
                self.scheme.is_compressed_lvl(l)
                    && !(self.scheme.is_unique_level(l) && l < coo_start)
            })
            .unwrap_or(rank - 1)
    }

    /// Checks that `appended` more children fit at level `lvl`: the largest
    /// position written must fit `P`, and the empty ranges reserved for the
    /// next level must be countable.
    pub(crate) fn check_append_room(&self, lvl: usize, appended: usize) -> StorageResult<()> {
        if appended == 0 || !self.scheme.is_compressed_lvl(lvl) {
            return Ok(());
        }
        P::from_index(self.crd_count(lvl) + appended)?;
        if lvl + 1 < self.lvl_rank() {
            self.dense_run_slots(lvl + 1)?;
        }
        Ok(())
    }

    /// Closes every position range that was reserved but never received a child.
    ///
    /// Applies to compressed levels below the top one; an unopened slot still
    /// holds zero and is set to the preceding slot's value.
    pub fn finalize(&mut self) -> StorageResult<()> {
        let rank = self.lvl_rank();
        if let Some(l) = (0..rank).find(|&l| self.scheme.is_compressed_with_hi_lvl(l)) {
            return Err(StorageError::NotImplemented(format!(
                "finalizing hi/lo position level {}",
                l
            )));
        }

        let mut repaired = 0usize;
        for l in 1..rank {
            if !self.scheme.is_compressed_lvl(l) {
                continue;
            }
            let msz = self.specifier.pos_mem_size(l);
            if let Some(buf) = self.buffers.positions[l].as_mut() {
                if msz < 2 || !buf[1..msz].iter().any(|p| p.to_index() == 0) {
                    continue;
                }
                let data = buf.to_mut();
                let mut prev = data[0];
                for slot in data[1..msz].iter_mut() {
                    if slot.to_index() == 0 {
                        if prev.to_index() != 0 {
                            repaired += 1;
                        }
                        *slot = prev;
                    } else {
                        prev = *slot;
                    }
                }
            }
        }
        tracing::debug!(repaired, "finalized sparse storage");
        Ok(())
    }
}

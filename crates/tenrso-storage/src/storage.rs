//! Sparse tensor storage instances
//!
//! A [`SparseStorage`] pairs a [`LevelScheme`] with its physical
//! [`StorageBuffers`] and the [`StorageSpecifier`] describing them.
//!
//! # Lifecycle
//!
//! 1. **Create**: [`SparseStorage::allocate`] builds an empty instance sized
//!    by heuristics (or exactly, given a size hint); `pack`, `from_reader` and
//!    `to_owned_storage` create populated instances.
//! 2. **Build**: [`insert`](SparseStorage::insert) or
//!    [`expand`](SparseStorage::expand)/[`compress`](SparseStorage::compress)
//!    append entries.
//! 3. **Load**: [`finalize`](SparseStorage::finalize) repairs positions of
//!    parents that never received a child.
//! 4. **Read**: size queries and buffer accessors.
//!
//! # Examples
//!
//! ```
//! use tenrso_storage::{DimSize, LevelScheme, SparseStorage};
//!
//! let scheme = LevelScheme::csr(DimSize::Static(3), DimSize::Static(3));
//! let mut csr = SparseStorage::<f64>::allocate(scheme, &[], None).unwrap();
//! csr.insert(&[0, 0], 1.0).unwrap();
//! csr.insert(&[0, 2], 2.0).unwrap();
//! csr.insert(&[2, 1], 3.0).unwrap();
//! csr.finalize().unwrap();
//!
//! assert_eq!(csr.positions(1), &[0, 2, 2, 3]);
//! assert_eq!(csr.coordinates(1).to_vec(), vec![0, 2, 1]);
//! assert_eq!(csr.values(), &[1.0, 2.0, 3.0]);
//! ```

use std::borrow::Cow;

use scirs2_core::numeric::Num;
use tracing::debug;

use crate::buffers::{push_back, CoordinateView, StorageBuffers};
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::index::IndexType;
use crate::level::LevelScheme;
use crate::specifier::StorageSpecifier;

/// A sparse tensor storage instance
///
/// `'a` is the lifetime of borrowed buffers; instances owning all their
/// buffers are `SparseStorage<'static, ...>` (see [`OwnedStorage`]).
#[derive(Debug, Clone)]
pub struct SparseStorage<'a, T: Clone, P: IndexType = usize, C: IndexType = usize> {
    pub(crate) scheme: LevelScheme,
    pub(crate) specifier: StorageSpecifier,
    pub(crate) buffers: StorageBuffers<'a, T, P, C>,
    pub(crate) config: StorageConfig,
}

/// Storage instance that owns every buffer
pub type OwnedStorage<T, P = usize, C = usize> = SparseStorage<'static, T, P, C>;

impl<T, P, C> SparseStorage<'static, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Allocates an empty storage instance with the default [`StorageConfig`].
    ///
    /// Returns an instance that owns its buffers.
    ///
    /// # Arguments
    ///
    /// * `scheme` - Level scheme of the tensor
    /// * `dyn_sizes` - Sizes of the dynamic dimensions, in dimension order
    /// * `size_hint` - Expected number of stored elements, if known
    ///
    /// # Errors
    ///
    /// - `dyn_sizes` does not match the scheme's dynamic dimension count
    /// - the scheme contains hi/lo position levels, which only `pack` builds
    pub fn allocate(
        scheme: LevelScheme,
        dyn_sizes: &[usize],
        size_hint: Option<usize>,
    ) -> StorageResult<Self> {
        Self::allocate_with_config(scheme, dyn_sizes, size_hint, StorageConfig::default())
    }

    /// Allocates an empty storage instance with explicit allocation heuristics
    pub fn allocate_with_config(
        scheme: LevelScheme,
        dyn_sizes: &[usize],
        size_hint: Option<usize>,
        config: StorageConfig,
    ) -> StorageResult<Self> {
        if let Some(l) = (0..scheme.lvl_rank()).find(|&l| scheme.is_compressed_with_hi_lvl(l)) {
            return Err(StorageError::NotImplemented(format!(
                "allocating hi/lo position level {}",
                l
            )));
        }
        let dim_sizes = scheme.resolve_dim_sizes(dyn_sizes)?;
        let lvl_sizes = scheme.lvl_sizes_from_dims(&dim_sizes);
        let (pos_cap, crd_cap, val_cap) =
            capacity_heuristics(&scheme, &dim_sizes, size_hint, &config);

        let lvl_rank = scheme.lvl_rank();
        let mut buffers = StorageBuffers::empty(lvl_rank);
        for l in 0..lvl_rank {
            if scheme.lvl_type(l).has_positions() {
                buffers.positions[l] = Some(Cow::Owned(vec![P::default(); pos_cap]));
            }
            if scheme.owns_crd_buffer(l) {
                buffers.coordinates[l] = Some(Cow::Owned(vec![C::default(); crd_cap]));
            }
        }
        buffers.values = Cow::Owned(vec![T::zero(); val_cap]);

        debug!(
            scheme = %scheme,
            pos_cap,
            crd_cap,
            val_cap,
            "allocated sparse storage"
        );

        let mut storage = Self {
            specifier: StorageSpecifier::new(lvl_rank),
            buffers,
            config,
            scheme,
        };

        // Every compressed level starts with a single zero position, which
        // keeps the "linear + 1" length property from the start.
        for (l, &sz) in lvl_sizes.iter().enumerate() {
            storage.specifier.set_lvl_size(l, sz);
            if storage.scheme.is_compressed_lvl(l) {
                storage.push_position(l, P::default(), 1);
            }
        }
        storage.alloc_scheme_for_rank(0)?;
        Ok(storage)
    }
}

/// Initial (position, coordinate, value) capacities for a fresh instance
fn capacity_heuristics(
    scheme: &LevelScheme,
    dim_sizes: &[usize],
    size_hint: Option<usize>,
    config: &StorageConfig,
) -> (usize, usize, usize) {
    let default = config.default_capacity;
    if scheme.is_all_dense() {
        return (0, 0, dim_sizes.iter().product());
    }
    match size_hint {
        Some(nse) if scheme.coo_start() == 0 => (2, scheme.dim_rank() * nse, nse),
        Some(nse)
            if scheme.dim_rank() == 2
                && scheme.is_dense_lvl(0)
                && scheme.is_compressed_lvl(1) =>
        {
            (nse + 1, nse, nse)
        }
        Some(nse) => (default, default, nse),
        None => (default, default, default),
    }
}

impl<'a, T, P, C> SparseStorage<'a, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Prepares levels `start..` for insertion under a freshly created parent.
    ///
    /// The first level with positions below `start` receives one empty range
    /// per slot of the dense run above it. If every remaining level is dense,
    /// the value buffer receives the whole dense block instead.
    pub(crate) fn alloc_scheme_for_rank(&mut self, start: usize) -> StorageResult<()> {
        let linear = self.dense_run_slots(start)?;
        let rank = self.scheme.lvl_rank();
        match (start..rank).find(|&l| !self.scheme.is_dense_lvl(l)) {
            Some(l) if self.scheme.is_compressed_lvl(l) => {
                self.push_position(l, P::default(), linear);
            }
            Some(_) => {}
            None => self.push_value(T::zero(), linear),
        }
        Ok(())
    }

    /// Product of the sizes of the dense levels starting at `start`, up to
    /// the first level that is not dense
    pub(crate) fn dense_run_slots(&self, start: usize) -> StorageResult<usize> {
        let mut linear: usize = 1;
        for l in start..self.scheme.lvl_rank() {
            let lt = self.scheme.lvl_type(l);
            if lt.is_compressed_with_hi() {
                return Err(StorageError::NotImplemented(format!(
                    "preparing hi/lo position level {}",
                    l
                )));
            }
            if !lt.is_dense() {
                break;
            }
            linear = linear
                .checked_mul(self.specifier.lvl_size(l))
                .ok_or(StorageError::IndexOverflow {
                    value: usize::MAX,
                    bits: usize::BITS,
                })?;
        }
        Ok(linear)
    }

    pub(crate) fn push_position(&mut self, lvl: usize, value: P, repeat: usize) {
        let mut msz = self.specifier.pos_mem_size(lvl);
        if let Some(buf) = self.buffers.positions[lvl].as_mut() {
            push_back(buf, &mut msz, value, repeat, P::default(), &self.config);
        }
        self.specifier.set_pos_mem_size(lvl, msz);
    }

    /// Appends one coordinate at `lvl`; inside an array-of-structures region
    /// this appends to the shared buffer.
    pub(crate) fn push_coordinate(&mut self, lvl: usize, value: C) {
        let (buf_lvl, _, _) = self.scheme.crd_location(lvl);
        let mut msz = self.specifier.crd_mem_size(buf_lvl);
        let buf = self.buffers.coordinates[buf_lvl].get_or_insert_with(|| Cow::Owned(Vec::new()));
        push_back(buf, &mut msz, value, 1, C::default(), &self.config);
        self.specifier.set_crd_mem_size(buf_lvl, msz);
    }

    pub(crate) fn push_value(&mut self, value: T, repeat: usize) {
        let mut msz = self.specifier.val_mem_size();
        push_back(
            &mut self.buffers.values,
            &mut msz,
            value,
            repeat,
            T::zero(),
            &self.config,
        );
        self.specifier.set_val_mem_size(msz);
    }

    /// Reads position `i` of `lvl` from the physical buffer
    #[inline]
    pub(crate) fn position_at(&self, lvl: usize, i: usize) -> usize {
        self.buffers.positions[lvl]
            .as_ref()
            .map_or(0, |p| p[i].to_index())
    }

    #[inline]
    pub(crate) fn store_position(
        &mut self,
        lvl: usize,
        i: usize,
        value: usize,
    ) -> StorageResult<()> {
        let value = P::from_index(value)?;
        if let Some(buf) = self.buffers.positions[lvl].as_mut() {
            buf.to_mut()[i] = value;
        }
        Ok(())
    }

    /// Reads the coordinate of entry `i` at `lvl`
    #[inline]
    pub(crate) fn coordinate_at(&self, lvl: usize, i: usize) -> usize {
        let (buf_lvl, stride, offset) = self.scheme.crd_location(lvl);
        self.buffers.coordinates[buf_lvl]
            .as_ref()
            .map_or(0, |c| c[i * stride + offset].to_index())
    }

    /// Number of entries stored at `lvl` (tuples, for array-of-structures regions)
    #[inline]
    pub(crate) fn crd_count(&self, lvl: usize) -> usize {
        let (buf_lvl, stride, _) = self.scheme.crd_location(lvl);
        self.specifier.crd_mem_size(buf_lvl) / stride
    }

    /// Level holding the flat coordinate buffer exchanged by pack/unpack
    pub(crate) fn flat_crd_level(&self) -> Option<usize> {
        let rank = self.scheme.lvl_rank();
        let coo_start = self.scheme.coo_start();
        if coo_start < rank {
            Some(coo_start)
        } else if self.scheme.lvl_type(rank - 1).has_positions() {
            Some(rank - 1)
        } else {
            None
        }
    }

    #[inline]
    pub fn scheme(&self) -> &LevelScheme {
        &self.scheme
    }

    #[inline]
    pub fn specifier(&self) -> &StorageSpecifier {
        &self.specifier
    }

    #[inline]
    pub fn buffers(&self) -> &StorageBuffers<'a, T, P, C> {
        &self.buffers
    }

    #[inline]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    #[inline]
    pub fn lvl_rank(&self) -> usize {
        self.scheme.lvl_rank()
    }

    #[inline]
    pub fn dim_rank(&self) -> usize {
        self.scheme.dim_rank()
    }

    /// Size of level `lvl`
    #[inline]
    pub fn lvl_size(&self, lvl: usize) -> usize {
        self.specifier.lvl_size(lvl)
    }

    /// Size of dimension `dim`, accounting for the dimension-to-level ordering
    #[inline]
    pub fn dim_size(&self, dim: usize) -> usize {
        self.specifier.lvl_size(self.scheme.to_lvl(dim))
    }

    pub fn dim_sizes(&self) -> Vec<usize> {
        (0..self.dim_rank()).map(|d| self.dim_size(d)).collect()
    }

    /// Occupied positions of `lvl`; empty for levels without positions.
    ///
    /// # Panics
    ///
    /// Panics if `lvl >= lvl_rank()`.
    pub fn positions(&self, lvl: usize) -> &[P] {
        let msz = self.specifier.pos_mem_size(lvl);
        self.buffers.positions[lvl]
            .as_deref()
            .map_or(&[], |p| &p[..msz])
    }

    /// Occupied coordinates of `lvl`, independent of how they are laid out.
    ///
    /// # Panics
    ///
    /// Panics if `lvl >= lvl_rank()`.
    pub fn coordinates(&self, lvl: usize) -> CoordinateView<'_, C> {
        if self.scheme.is_dense_lvl(lvl) {
            return CoordinateView::empty();
        }
        let (buf_lvl, stride, offset) = self.scheme.crd_location(lvl);
        let msz = self.specifier.crd_mem_size(buf_lvl);
        match self.buffers.coordinates[buf_lvl].as_deref() {
            Some(data) => CoordinateView::new(&data[..msz], offset, stride),
            None => CoordinateView::empty(),
        }
    }

    /// The flat (array-of-structures) coordinate buffer of the COO region
    pub fn coordinates_buffer(&self) -> &[C] {
        match self.flat_crd_level() {
            Some(l) => {
                let msz = self.specifier.crd_mem_size(l);
                self.buffers.coordinates[l]
                    .as_deref()
                    .map_or(&[], |c| &c[..msz])
            }
            None => &[],
        }
    }

    /// Occupied values
    pub fn values(&self) -> &[T] {
        &self.buffers.values[..self.specifier.val_mem_size()]
    }

    /// Number of stored entries
    #[inline]
    pub fn number_of_entries(&self) -> usize {
        self.specifier.val_mem_size()
    }

    #[inline]
    pub fn is_slice(&self) -> bool {
        self.specifier.is_slice()
    }

    #[inline]
    pub fn slice_offset(&self, dim: usize) -> usize {
        self.specifier.slice_offset(dim)
    }

    #[inline]
    pub fn slice_stride(&self, dim: usize) -> usize {
        self.specifier.slice_stride(dim)
    }

    /// True if any buffer is borrowed from another instance or caller data
    #[inline]
    pub fn is_borrowed(&self) -> bool {
        self.buffers.is_borrowed()
    }

    /// Deep-copies every buffer into a new, independent instance.
    ///
    /// Returns an instance that owns its buffers; the specifier is reused.
    pub fn to_owned_storage(&self) -> OwnedStorage<T, P, C> {
        SparseStorage {
            scheme: self.scheme.clone(),
            specifier: self.specifier.clone(),
            buffers: self.buffers.clone().into_owned(),
            config: self.config,
        }
    }

    /// Takes ownership of every buffer, copying only the borrowed ones
    pub fn into_owned(self) -> OwnedStorage<T, P, C> {
        SparseStorage {
            scheme: self.scheme,
            specifier: self.specifier,
            buffers: self.buffers.into_owned(),
            config: self.config,
        }
    }
}

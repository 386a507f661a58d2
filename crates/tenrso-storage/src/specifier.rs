//! Storage specifier: the compact metadata record of a storage instance
//!
//! The specifier keeps everything about a storage instance that is not a
//! buffer:
//!
//! - the logical size of every level,
//! - the occupied length ("memory size") of every position and coordinate
//!   buffer and of the value buffer, which is at most the buffer's physical
//!   capacity,
//! - for slice views, an (offset, size, stride) window per dimension.
//!
//! Every operation that changes occupancy updates the specifier in place.
//! Deriving an independent instance (pack, slice, copy) clones it.

use serde::{Deserialize, Serialize};

/// Offset/size/stride window over one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimSlice {
    pub offset: usize,
    pub size: usize,
    pub stride: usize,
}

impl DimSlice {
    pub fn new(offset: usize, size: usize, stride: usize) -> Self {
        Self {
            offset,
            size,
            stride,
        }
    }

    /// Window covering a whole dimension of the given size
    pub fn full(size: usize) -> Self {
        Self::new(0, size, 1)
    }

    /// Last coordinate of the source dimension covered by this window
    pub fn last(&self) -> Option<usize> {
        self.size
            .checked_sub(1)
            .and_then(|n| n.checked_mul(self.stride))
            .and_then(|span| span.checked_add(self.offset))
    }
}

/// Sizes, occupancy counters and slice parameters of one storage instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSpecifier {
    lvl_sizes: Vec<usize>,
    pos_mem_sizes: Vec<usize>,
    /// For an array-of-structures region the counter lives at its first level
    crd_mem_sizes: Vec<usize>,
    val_mem_size: usize,
    dim_slices: Option<Vec<DimSlice>>,
}

impl StorageSpecifier {
    /// An empty specifier for `lvl_rank` levels with all counters at zero
    pub fn new(lvl_rank: usize) -> Self {
        Self {
            lvl_sizes: vec![0; lvl_rank],
            pos_mem_sizes: vec![0; lvl_rank],
            crd_mem_sizes: vec![0; lvl_rank],
            val_mem_size: 0,
            dim_slices: None,
        }
    }

    #[inline]
    pub fn lvl_rank(&self) -> usize {
        self.lvl_sizes.len()
    }

    #[inline]
    pub fn lvl_size(&self, lvl: usize) -> usize {
        self.lvl_sizes[lvl]
    }

    #[inline]
    pub fn lvl_sizes(&self) -> &[usize] {
        &self.lvl_sizes
    }

    #[inline]
    pub fn set_lvl_size(&mut self, lvl: usize, size: usize) {
        self.lvl_sizes[lvl] = size;
    }

    #[inline]
    pub fn pos_mem_size(&self, lvl: usize) -> usize {
        self.pos_mem_sizes[lvl]
    }

    #[inline]
    pub fn set_pos_mem_size(&mut self, lvl: usize, size: usize) {
        self.pos_mem_sizes[lvl] = size;
    }

    #[inline]
    pub fn crd_mem_size(&self, lvl: usize) -> usize {
        self.crd_mem_sizes[lvl]
    }

    #[inline]
    pub fn set_crd_mem_size(&mut self, lvl: usize, size: usize) {
        self.crd_mem_sizes[lvl] = size;
    }

    #[inline]
    pub fn val_mem_size(&self) -> usize {
        self.val_mem_size
    }

    #[inline]
    pub fn set_val_mem_size(&mut self, size: usize) {
        self.val_mem_size = size;
    }

    #[inline]
    pub fn is_slice(&self) -> bool {
        self.dim_slices.is_some()
    }

    pub fn dim_slice(&self, dim: usize) -> Option<DimSlice> {
        self.dim_slices.as_ref().map(|slices| slices[dim])
    }

    /// Slice offset of `dim`; zero for instances that are not slices
    pub fn slice_offset(&self, dim: usize) -> usize {
        self.dim_slice(dim).map_or(0, |s| s.offset)
    }

    /// Slice stride of `dim`; one for instances that are not slices
    pub fn slice_stride(&self, dim: usize) -> usize {
        self.dim_slice(dim).map_or(1, |s| s.stride)
    }

    /// Records the window for `dim`, turning this specifier into a slice specifier.
    ///
    /// Dimensions without an explicit window cover their whole extent; the
    /// caller passes `dim_sizes` so those defaults can be filled in.
    pub fn set_dim_slice(&mut self, dim: usize, slice: DimSlice, dim_sizes: &[usize]) {
        let slices = self
            .dim_slices
            .get_or_insert_with(|| dim_sizes.iter().map(|&sz| DimSlice::full(sz)).collect());
        slices[dim] = slice;
    }
}

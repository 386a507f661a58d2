//! Physical buffers of a storage instance
//!
//! # Layout
//!
//! For a level scheme of rank `n`:
//! - `positions[l]`: present for compressed levels; entries `i` and `i + 1`
//!   bound the children of parent `i`
//! - `coordinates[l]`: present for non-dense levels that own a buffer. The
//!   trailing COO region shares a single array-of-structures buffer stored at
//!   its first level, with one interleaved tuple per stored entry
//! - `values`: one entry per stored element
//!
//! Every buffer's length is its physical capacity. The occupied prefix is
//! tracked separately by the [`StorageSpecifier`](crate::StorageSpecifier),
//! so buffers can be over-allocated and grown geometrically.
//!
//! # Ownership
//!
//! Buffers are `Cow` slices. An instance either owns its buffers or borrows
//! them from caller data (`pack`) or from another instance (`slice`). Writing
//! to a borrowed buffer first copies it, so a borrowing instance never
//! mutates or frees memory it does not own.

use std::borrow::Cow;

use crate::config::StorageConfig;
use crate::index::IndexType;

/// Position, coordinate and value buffers of one storage instance
#[derive(Debug, Clone)]
pub struct StorageBuffers<'a, T: Clone, P: IndexType, C: IndexType> {
    pub(crate) positions: Vec<Option<Cow<'a, [P]>>>,
    pub(crate) coordinates: Vec<Option<Cow<'a, [C]>>>,
    pub(crate) values: Cow<'a, [T]>,
}

impl<'a, T: Clone, P: IndexType, C: IndexType> StorageBuffers<'a, T, P, C> {
    /// Buffers for `lvl_rank` levels with no position or coordinate arrays yet
    pub(crate) fn empty(lvl_rank: usize) -> Self {
        Self {
            positions: vec![None; lvl_rank],
            coordinates: vec![None; lvl_rank],
            values: Cow::Owned(Vec::new()),
        }
    }

    /// Physical capacity of the position buffer at `lvl`
    pub fn position_capacity(&self, lvl: usize) -> usize {
        self.positions[lvl].as_ref().map_or(0, |p| p.len())
    }

    /// Physical capacity of the coordinate buffer owned by `lvl`
    pub fn coordinate_capacity(&self, lvl: usize) -> usize {
        self.coordinates[lvl].as_ref().map_or(0, |c| c.len())
    }

    /// Physical capacity of the value buffer
    pub fn value_capacity(&self) -> usize {
        self.values.len()
    }

    /// True if any buffer is borrowed rather than owned
    pub fn is_borrowed(&self) -> bool {
        matches!(self.values, Cow::Borrowed(_))
            || self
                .positions
                .iter()
                .any(|p| matches!(p, Some(Cow::Borrowed(_))))
            || self
                .coordinates
                .iter()
                .any(|c| matches!(c, Some(Cow::Borrowed(_))))
    }

    /// Takes ownership of every buffer, copying the borrowed ones
    pub fn into_owned(self) -> StorageBuffers<'static, T, P, C> {
        StorageBuffers {
            positions: self
                .positions
                .into_iter()
                .map(|p| p.map(|p| Cow::Owned(p.into_owned())))
                .collect(),
            coordinates: self
                .coordinates
                .into_iter()
                .map(|c| c.map(|c| Cow::Owned(c.into_owned())))
                .collect(),
            values: Cow::Owned(self.values.into_owned()),
        }
    }

    /// Borrows every buffer without copying
    pub fn share(&self) -> StorageBuffers<'_, T, P, C> {
        StorageBuffers {
            positions: self
                .positions
                .iter()
                .map(|p| p.as_deref().map(Cow::Borrowed))
                .collect(),
            coordinates: self
                .coordinates
                .iter()
                .map(|c| c.as_deref().map(Cow::Borrowed))
                .collect(),
            values: Cow::Borrowed(&self.values[..]),
        }
    }
}

/// Appends `repeat` copies of `value` at `*mem_size`, growing the buffer first if needed.
///
/// New capacity beyond the written range is filled with `fill`.
pub(crate) fn push_back<X: Clone>(
    buf: &mut Cow<'_, [X]>,
    mem_size: &mut usize,
    value: X,
    repeat: usize,
    fill: X,
    config: &StorageConfig,
) {
    let needed = *mem_size + repeat;
    let data = buf.to_mut();
    if needed > data.len() {
        let capacity = config.grown_capacity(data.len(), needed);
        tracing::trace!(from = data.len(), to = capacity, "growing storage buffer");
        data.resize(capacity, fill);
    }
    data[*mem_size..needed].fill(value);
    *mem_size = needed;
}

/// Strided, read-only view of one level's coordinates
///
/// The same accessor works whether the level owns its coordinate buffer
/// (stride 1) or lives in an array-of-structures region.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateView<'b, C> {
    data: &'b [C],
    offset: usize,
    stride: usize,
    len: usize,
}

impl<'b, C: IndexType> CoordinateView<'b, C> {
    pub(crate) fn new(data: &'b [C], offset: usize, stride: usize) -> Self {
        let stride = stride.max(1);
        Self {
            data,
            offset,
            stride,
            len: data.len() / stride,
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            data: &[],
            offset: 0,
            stride: 1,
            len: 0,
        }
    }

    /// Number of stored coordinates at this level
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn get(&self, i: usize) -> Option<C> {
        if i < self.len {
            Some(self.data[i * self.stride + self.offset])
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = C> + 'b {
        self.data
            .iter()
            .skip(self.offset)
            .step_by(self.stride)
            .take(self.len)
            .copied()
    }

    pub fn to_vec(&self) -> Vec<C> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_back_grows_geometrically() {
        let config = StorageConfig::default();
        let mut buf: Cow<'_, [usize]> = Cow::Owned(vec![0; 2]);
        let mut msz = 0;
        for i in 0..5 {
            push_back(&mut buf, &mut msz, i, 1, 0, &config);
        }
        assert_eq!(msz, 5);
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[..5], &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_push_back_repeat() {
        let config = StorageConfig::default();
        let mut buf: Cow<'_, [u32]> = Cow::Owned(vec![9; 1]);
        let mut msz = 1;
        push_back(&mut buf, &mut msz, 0, 3, 0, &config);
        assert_eq!(&buf[..msz], &[9, 0, 0, 0]);
    }

    #[test]
    fn test_push_back_copies_borrowed_buffer() {
        let config = StorageConfig::default();
        let source = vec![1usize, 2, 3];
        let mut buf: Cow<'_, [usize]> = Cow::Borrowed(&source);
        let mut msz = 3;
        push_back(&mut buf, &mut msz, 4, 1, 0, &config);
        assert!(matches!(buf, Cow::Owned(_)));
        assert_eq!(&buf[..msz], &[1, 2, 3, 4]);
        assert_eq!(source, vec![1, 2, 3]);
    }

    #[test]
    fn test_coordinate_view_strided() {
        let aos = [0usize, 10, 1, 11, 2, 12];
        let first = CoordinateView::new(&aos, 0, 2);
        let second = CoordinateView::new(&aos, 1, 2);
        assert_eq!(first.to_vec(), vec![0, 1, 2]);
        assert_eq!(second.to_vec(), vec![10, 11, 12]);
        assert_eq!(second.get(2), Some(12));
        assert_eq!(second.get(3), None);
    }

    #[test]
    fn test_share_and_into_owned() {
        let mut buffers = StorageBuffers::<f64, usize, usize>::empty(1);
        buffers.values = Cow::Owned(vec![1.0, 2.0]);
        let shared = buffers.share();
        assert!(shared.is_borrowed());
        let owned = shared.into_owned();
        assert!(!owned.is_borrowed());
        assert_eq!(&owned.values[..], &[1.0, 2.0]);
    }
}

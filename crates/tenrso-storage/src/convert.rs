//! Re-encoding and slice views
//!
//! [`SparseStorage::convert`] changes only element widths: the target scheme
//! must have the same level structure, so every buffer keeps its layout and
//! is copied (same type) or cast element by element. Cross-structure
//! conversion is a composition of unpack, pack and insert.
//!
//! [`SparseStorage::slice`] shares every buffer with its source and records an
//! offset/size/stride window per dimension in its own specifier.

use std::any::{Any, TypeId};
use std::borrow::Cow;

use scirs2_core::numeric::{Num, NumCast};

use crate::buffers::StorageBuffers;
use crate::error::{StorageError, StorageResult};
use crate::index::IndexType;
use crate::level::LevelScheme;
use crate::specifier::DimSlice;
use crate::storage::{OwnedStorage, SparseStorage};

impl<'a, T, P, C> SparseStorage<'a, T, P, C>
where
    T: Num + NumCast + Copy + 'static,
    P: IndexType,
    C: IndexType,
{
    /// Re-encodes this instance with other value, position or coordinate types.
    ///
    /// Returns an instance that owns its buffers. The full physical length of
    /// every buffer is carried over and the specifier is reused.
    ///
    /// # Errors
    ///
    /// - `target` differs in level types, ordering or dimension shape
    /// - this instance is a slice view
    /// - a value or index does not fit the target type
    #[tracing::instrument(skip_all, fields(scheme = %target))]
    pub fn convert<T2, P2, C2>(
        &self,
        target: &LevelScheme,
    ) -> StorageResult<OwnedStorage<T2, P2, C2>>
    where
        T2: Num + NumCast + Copy + 'static,
        P2: IndexType,
        C2: IndexType,
    {
        if !self.scheme.same_structure(target) {
            return Err(StorageError::incompatible(format!(
                "cannot convert {} to {}",
                self.scheme, target
            )));
        }
        if self.is_slice() {
            return Err(StorageError::incompatible("cannot convert a slice view"));
        }

        let positions: Vec<Option<Cow<'static, [P2]>>> = self
            .buffers
            .positions
            .iter()
            .map(|p| {
                p.as_deref()
                    .map(|p| copy_or_cast(p, |_, x| P2::from_index(x.to_index())).map(Cow::Owned))
                    .transpose()
            })
            .collect::<StorageResult<_>>()?;
        let coordinates: Vec<Option<Cow<'static, [C2]>>> = self
            .buffers
            .coordinates
            .iter()
            .map(|c| {
                c.as_deref()
                    .map(|c| copy_or_cast(c, |_, x| C2::from_index(x.to_index())).map(Cow::Owned))
                    .transpose()
            })
            .collect::<StorageResult<_>>()?;
        let values = copy_or_cast(&self.buffers.values[..], |position, v: T| {
            <T2 as NumCast>::from(v).ok_or(StorageError::ValueCast { position })
        })?;

        tracing::debug!(entries = self.number_of_entries(), "converted sparse storage");
        Ok(SparseStorage {
            scheme: target.clone(),
            specifier: self.specifier.clone(),
            buffers: StorageBuffers {
                positions,
                coordinates,
                values: Cow::Owned(values),
            },
            config: self.config,
        })
    }
}

/// Bulk-copies `src` when `X` and `Y` are the same type, casts element-wise otherwise
fn copy_or_cast<X, Y, F>(src: &[X], cast: F) -> StorageResult<Vec<Y>>
where
    X: Copy + 'static,
    Y: 'static,
    F: Fn(usize, X) -> StorageResult<Y>,
{
    if TypeId::of::<X>() == TypeId::of::<Y>() {
        let copied: Box<dyn Any> = Box::new(src.to_vec());
        if let Ok(same) = copied.downcast::<Vec<Y>>() {
            return Ok(*same);
        }
    }
    src.iter().enumerate().map(|(i, &x)| cast(i, x)).collect()
}

impl<'a, T, P, C> SparseStorage<'a, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Creates a view over a window of every dimension, sharing all buffers.
    ///
    /// `slices` holds one window per dimension, relative to this instance;
    /// slicing a slice composes the windows. Returns an instance that borrows
    /// from `self`.
    ///
    /// # Errors
    ///
    /// - not exactly one window per dimension
    /// - a zero stride, or a window reaching past its dimension
    pub fn slice(&self, slices: &[DimSlice]) -> StorageResult<SparseStorage<'_, T, P, C>> {
        let dim_rank = self.dim_rank();
        if slices.len() != dim_rank {
            return Err(StorageError::RankMismatch {
                expected: dim_rank,
                got: slices.len(),
            });
        }
        let dim_sizes = self.dim_sizes();
        for (d, s) in slices.iter().enumerate() {
            if s.stride == 0 {
                return Err(StorageError::InvalidSlice {
                    dim: d,
                    reason: "stride must be positive".to_string(),
                });
            }
            if let Some(last) = s.last() {
                if last >= dim_sizes[d] {
                    return Err(StorageError::InvalidSlice {
                        dim: d,
                        reason: format!("reaches {} but size is {}", last, dim_sizes[d]),
                    });
                }
            } else if s.size > 0 {
                return Err(StorageError::InvalidSlice {
                    dim: d,
                    reason: "window overflows".to_string(),
                });
            }
        }

        let mut specifier = self.specifier.clone();
        let source_sizes = match (0..dim_rank)
            .map(|d| self.specifier.dim_slice(d))
            .collect::<Option<Vec<_>>>()
        {
            Some(existing) => existing.iter().map(|s| s.size).collect(),
            None => dim_sizes.clone(),
        };
        for (d, s) in slices.iter().enumerate() {
            let composed = DimSlice::new(
                self.slice_offset(d) + s.offset * self.slice_stride(d),
                s.size,
                self.slice_stride(d) * s.stride,
            );
            specifier.set_dim_slice(d, composed, &source_sizes);
            specifier.set_lvl_size(self.scheme.to_lvl(d), s.size);
        }

        tracing::debug!(?slices, "created slice view");
        Ok(SparseStorage {
            scheme: self.scheme.clone(),
            specifier,
            buffers: self.buffers.share(),
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::DimSize;

    fn s(n: usize) -> DimSize {
        DimSize::Static(n)
    }

    fn sample_csr() -> SparseStorage<'static, f64> {
        let mut a =
            SparseStorage::<f64>::allocate(LevelScheme::csr(s(3), s(3)), &[], None).unwrap();
        a.insert(&[0, 0], 1.0).unwrap();
        a.insert(&[0, 2], 2.0).unwrap();
        a.insert(&[2, 1], 3.0).unwrap();
        a.finalize().unwrap();
        a
    }

    #[test]
    fn test_convert_narrows_index_types() {
        let a = sample_csr();
        let b = a.convert::<f32, u32, u16>(a.scheme()).unwrap();
        assert_eq!(b.positions(1), &[0u32, 2, 2, 3]);
        assert_eq!(b.coordinates(1).to_vec(), vec![0u16, 2, 1]);
        assert_eq!(b.values(), &[1.0f32, 2.0, 3.0]);
        assert_eq!(
            b.buffers().position_capacity(1),
            a.buffers().position_capacity(1)
        );
    }

    #[test]
    fn test_convert_same_types_copies() {
        let a = sample_csr();
        let b = a.convert::<f64, usize, usize>(a.scheme()).unwrap();
        assert_eq!(b.values(), a.values());
        assert_eq!(b.specifier(), a.specifier());
    }

    #[test]
    fn test_convert_rejects_other_structure() {
        let a = sample_csr();
        let err = a
            .convert::<f64, usize, usize>(&LevelScheme::dcsr(s(3), s(3)))
            .unwrap_err();
        assert!(matches!(err, StorageError::IncompatibleSchemes { .. }));
    }

    #[test]
    fn test_convert_reports_overflow() {
        let mut a =
            SparseStorage::<f64>::allocate(LevelScheme::csr(s(1), s(300)), &[], None).unwrap();
        a.insert(&[0, 299], 1.0).unwrap();
        let err = a.convert::<f64, usize, u8>(a.scheme()).unwrap_err();
        assert!(matches!(err, StorageError::IndexOverflow { bits: 8, .. }));
    }

    #[test]
    fn test_slice_shares_buffers_and_keeps_source() {
        let a = sample_csr();
        let view = a
            .slice(&[DimSlice::new(1, 2, 1), DimSlice::new(0, 2, 2)])
            .unwrap();
        assert!(view.is_slice());
        assert!(view.is_borrowed());
        assert_eq!(view.slice_offset(0), 1);
        assert_eq!(view.slice_stride(1), 2);
        assert_eq!(view.dim_sizes(), vec![2, 2]);
        assert_eq!(view.values(), a.values());

        assert!(!a.is_slice());
        assert_eq!(a.dim_sizes(), vec![3, 3]);
    }

    #[test]
    fn test_slice_of_slice_composes() {
        let a = sample_csr();
        let view = a
            .slice(&[DimSlice::full(3), DimSlice::new(1, 2, 1)])
            .unwrap();
        let inner = view
            .slice(&[DimSlice::new(2, 1, 1), DimSlice::new(1, 1, 1)])
            .unwrap();
        assert_eq!(inner.slice_offset(0), 2);
        assert_eq!(inner.slice_offset(1), 2);
        assert_eq!(inner.dim_sizes(), vec![1, 1]);
    }

    #[test]
    fn test_invalid_slices() {
        let a = sample_csr();
        let err = a
            .slice(&[DimSlice::new(0, 3, 2), DimSlice::full(3)])
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidSlice { dim: 0, .. }));
        let err = a.slice(&[DimSlice::full(3)]).unwrap_err();
        assert!(matches!(err, StorageError::RankMismatch { .. }));
        let err = a
            .slice(&[DimSlice::new(0, 1, 0), DimSlice::full(3)])
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidSlice { dim: 0, .. }));
    }

    #[test]
    fn test_convert_rejects_slice() {
        let a = sample_csr();
        let view = a.slice(&[DimSlice::full(3), DimSlice::full(3)]).unwrap();
        let err = view.convert::<f64, usize, usize>(a.scheme()).unwrap_err();
        assert!(matches!(err, StorageError::IncompatibleSchemes { .. }));
    }
}

//! Exchange with flat coordinate lists
//!
//! [`SparseStorage::pack`] turns a flat COO list (`count` tuples of level
//! coordinates plus `count` values) into storage for an ordered COO scheme.
//! The caller's buffers are borrowed, only the top position array is built.
//! [`SparseStorage::unpack`] hands the flat lists back out.
//!
//! # Batched layouts
//!
//! A scheme may start with `batched` dense levels followed by the COO region.
//! The flat input then holds one fixed-capacity slot of `nse` entries per
//! batch. With plain compressed positions every slot is taken as full; with
//! hi/lo position pairs, trailing zero values mark the unused tail of a slot
//! so each batch can hold a different number of entries.
//!
//! # Examples
//!
//! ```
//! use tenrso_storage::{DimSize, LevelScheme, SparseStorage};
//!
//! let scheme = LevelScheme::coo(vec![DimSize::Static(4), DimSize::Static(4)]).unwrap();
//! let coords = [0usize, 1, 2, 0, 3, 3];
//! let values = [1.0f64, 2.0, 3.0];
//!
//! let coo: SparseStorage<f64> = SparseStorage::pack(scheme, &[], &coords, &values).unwrap();
//! assert!(coo.is_borrowed());
//! assert_eq!(coo.positions(0), &[0, 3]);
//!
//! let out = coo.unpack(None).unwrap();
//! assert_eq!(out.count, 3);
//! assert_eq!(&out.coordinates[..], &coords);
//! ```

use std::borrow::Cow;

use scirs2_core::numeric::Num;

use crate::buffers::StorageBuffers;
use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::index::IndexType;
use crate::level::LevelScheme;
use crate::specifier::StorageSpecifier;
use crate::storage::SparseStorage;

/// Flat lists returned by [`SparseStorage::unpack`]
#[derive(Debug, Clone)]
pub struct Unpacked<'s, T: Clone, C: Clone> {
    /// One value per entry (per batch slot, for batched layouts)
    pub values: Cow<'s, [T]>,
    /// Row-major tuples of the COO region's level coordinates
    pub coordinates: Cow<'s, [C]>,
    /// Number of entries; the largest per-batch count for batched layouts
    pub count: usize,
}

impl<'a, T, P, C> SparseStorage<'a, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Packs a flat COO list, borrowing the caller's buffers.
    ///
    /// `coordinates` holds `values.len()` tuples of level coordinates,
    /// row-major. Ordering and uniqueness are not checked.
    ///
    /// Returns an instance that borrows `coordinates` and `values`; mutating
    /// it copies the touched buffer first.
    ///
    /// # Errors
    ///
    /// - the scheme is not a unique COO scheme from level 0
    /// - `coordinates` does not hold one full tuple per value
    pub fn pack(
        scheme: LevelScheme,
        dyn_sizes: &[usize],
        coordinates: &'a [C],
        values: &'a [T],
    ) -> StorageResult<Self> {
        Self::pack_batched(scheme, dyn_sizes, 0, coordinates, values)
    }

    /// Packs a flat COO list laid out in fixed-capacity slots per batch.
    ///
    /// The first `batched` levels must be dense with static sizes; `values`
    /// holds `nse` entries for each of their combinations, `coordinates`
    /// the matching tuples of the remaining levels.
    #[tracing::instrument(skip_all, fields(batched = batched, len = values.len()))]
    pub fn pack_batched(
        scheme: LevelScheme,
        dyn_sizes: &[usize],
        batched: usize,
        coordinates: &'a [C],
        values: &'a [T],
    ) -> StorageResult<Self> {
        let (specifier, positions) =
            pack_layout::<T, P>(&scheme, dyn_sizes, batched, coordinates.len(), values)?;

        let mut buffers = StorageBuffers::empty(scheme.lvl_rank());
        buffers.positions[batched] = Some(Cow::Owned(positions));
        buffers.coordinates[batched] = Some(Cow::Borrowed(coordinates));
        buffers.values = Cow::Borrowed(values);
        Ok(Self {
            scheme,
            specifier,
            buffers,
            config: StorageConfig::default(),
        })
    }

    /// Returns the flat coordinate list and values.
    ///
    /// Without a `capacity` the occupied prefixes are borrowed. With one, the
    /// lists hold exactly `capacity` entries: a borrowed prefix of the physical
    /// buffers when they are long enough, a zero-extended copy otherwise.
    pub fn unpack(&self, capacity: Option<usize>) -> StorageResult<Unpacked<'_, T, C>> {
        check_coo_layout(&self.scheme, 0)?;
        let flat = self
            .flat_crd_level()
            .ok_or_else(|| StorageError::not_coo("no coordinate buffer"))?;
        let stride = self.lvl_rank();
        let count = self.number_of_entries();

        let crd_buf = self.buffers.coordinates[flat].as_deref().unwrap_or(&[]);
        let (values, coordinates) = match capacity {
            None => (
                Cow::Borrowed(self.values()),
                Cow::Borrowed(self.coordinates_buffer()),
            ),
            Some(cap) => (
                realloc_or_sub_view(&self.buffers.values[..], cap, T::zero()),
                realloc_or_sub_view(crd_buf, cap * stride, C::default()),
            ),
        };
        tracing::debug!(count, ?capacity, "unpacked coordinate list");
        Ok(Unpacked {
            values,
            coordinates,
            count,
        })
    }

    /// Unpacks a batched layout into fixed-capacity slots per batch.
    ///
    /// Every slot holds `capacity` entries (default: the largest batch),
    /// zero-filled past the batch's own count.
    ///
    /// # Errors
    ///
    /// - the scheme is not `batched` dense levels followed by a unique COO region
    /// - a batch holds more entries than `capacity`
    #[tracing::instrument(skip(self), fields(lvl_rank = self.lvl_rank()))]
    pub fn unpack_batched(
        &self,
        batched: usize,
        capacity: Option<usize>,
    ) -> StorageResult<Unpacked<'static, T, C>> {
        if batched == 0 {
            return self.unpack(capacity).map(|u| Unpacked {
                values: Cow::Owned(u.values.into_owned()),
                coordinates: Cow::Owned(u.coordinates.into_owned()),
                count: u.count,
            });
        }
        let layout = check_coo_layout(&self.scheme, batched)?;
        let pos_step = if layout.hi_lo { 2 } else { 1 };
        let stride = self.lvl_rank() - batched;
        let batch_count: usize = (0..batched).map(|l| self.lvl_size(l)).product();

        let ranges: Vec<(usize, usize)> = (0..batch_count)
            .map(|b| {
                let lo = self.position_at(batched, b * pos_step);
                let hi = self.position_at(batched, b * pos_step + 1);
                (lo, hi.max(lo))
            })
            .collect();
        let max_count = ranges.iter().map(|(lo, hi)| hi - lo).max().unwrap_or(0);
        let cap = capacity.unwrap_or(max_count);

        let values = &self.buffers.values[..];
        let crd = self.buffers.coordinates[batched].as_deref().unwrap_or(&[]);
        let mut out_values = vec![T::zero(); batch_count * cap];
        let mut out_crd = vec![C::default(); batch_count * cap * stride];
        for (b, &(lo, hi)) in ranges.iter().enumerate() {
            let n = hi - lo;
            if n > cap {
                return Err(StorageError::CapacityExceeded {
                    batch: b,
                    count: n,
                    capacity: cap,
                });
            }
            out_values[b * cap..b * cap + n].copy_from_slice(&values[lo..hi]);
            out_crd[b * cap * stride..(b * cap + n) * stride]
                .copy_from_slice(&crd[lo * stride..hi * stride]);
        }

        tracing::debug!(batch_count, cap, max_count, "unpacked batched coordinate list");
        Ok(Unpacked {
            values: Cow::Owned(out_values),
            coordinates: Cow::Owned(out_crd),
            count: max_count,
        })
    }
}

impl<T, P, C> SparseStorage<'static, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Packs a flat COO list, taking ownership of the buffers
    pub fn pack_owned(
        scheme: LevelScheme,
        dyn_sizes: &[usize],
        coordinates: Vec<C>,
        values: Vec<T>,
    ) -> StorageResult<Self> {
        let (specifier, positions) =
            pack_layout::<T, P>(&scheme, dyn_sizes, 0, coordinates.len(), &values)?;

        let mut buffers = StorageBuffers::empty(scheme.lvl_rank());
        buffers.positions[0] = Some(Cow::Owned(positions));
        buffers.coordinates[0] = Some(Cow::Owned(coordinates));
        buffers.values = Cow::Owned(values);
        Ok(Self {
            scheme,
            specifier,
            buffers,
            config: StorageConfig::default(),
        })
    }
}

/// Validates a pack input and computes its specifier and top position array
fn pack_layout<T: Num + Copy, P: IndexType>(
    scheme: &LevelScheme,
    dyn_sizes: &[usize],
    batched: usize,
    crd_len: usize,
    values: &[T],
) -> StorageResult<(StorageSpecifier, Vec<P>)> {
    let layout = check_coo_layout(scheme, batched)?;
    let dim_sizes = scheme.resolve_dim_sizes(dyn_sizes)?;
    let lvl_sizes = scheme.lvl_sizes_from_dims(&dim_sizes);
    let batch_count: usize = lvl_sizes[..batched].iter().product();

    if values.len() % batch_count != 0 {
        return Err(StorageError::LengthMismatch {
            what: "batched values",
            expected: values.len().next_multiple_of(batch_count),
            got: values.len(),
        });
    }
    let nse = values.len() / batch_count;
    let stride = scheme.lvl_rank() - batched;
    if crd_len != values.len() * stride {
        return Err(StorageError::LengthMismatch {
            what: "coordinates",
            expected: values.len() * stride,
            got: crd_len,
        });
    }

    let positions = if layout.hi_lo {
        hi_lo_positions::<T, P>(values, batch_count, nse)?
    } else {
        (0..=batch_count)
            .map(|b| P::from_index(b * nse))
            .collect::<StorageResult<Vec<_>>>()?
    };

    let mut specifier = StorageSpecifier::new(scheme.lvl_rank());
    for (l, &sz) in lvl_sizes.iter().enumerate() {
        specifier.set_lvl_size(l, sz);
    }
    specifier.set_pos_mem_size(batched, positions.len());
    specifier.set_crd_mem_size(batched, crd_len);
    specifier.set_val_mem_size(values.len());

    tracing::debug!(batch_count, nse, hi_lo = layout.hi_lo, "packed coordinate list");
    Ok((specifier, positions))
}

struct CooLayout {
    hi_lo: bool,
}

/// Checks for `batched` static dense levels followed by a unique COO region
fn check_coo_layout(scheme: &LevelScheme, batched: usize) -> StorageResult<CooLayout> {
    if !scheme.is_coo_shape(batched, true) {
        return Err(StorageError::not_coo(format!(
            "levels from {} are not a unique COO region in {}",
            batched, scheme
        )));
    }
    if let Some(l) = (0..batched).find(|&l| {
        !scheme.is_dense_lvl(l) || scheme.static_dim_size(scheme.to_dim(l)).is_none()
    }) {
        return Err(StorageError::not_coo(format!(
            "batch level {} must be dense with a static size",
            l
        )));
    }
    let hi_lo = scheme.is_compressed_with_hi_lvl(batched);
    if hi_lo && batched == 0 {
        return Err(StorageError::not_coo(
            "hi/lo position pairs require at least one batch level",
        ));
    }
    Ok(CooLayout { hi_lo })
}

/// (lo, hi) pairs per batch; trailing zero values shorten a batch's range
fn hi_lo_positions<T: Num + Copy, P: IndexType>(
    values: &[T],
    batch_count: usize,
    nse: usize,
) -> StorageResult<Vec<P>> {
    let mut positions = Vec::with_capacity(batch_count * 2);
    for b in 0..batch_count {
        let lo = b * nse;
        let slot = &values[lo..lo + nse];
        let len = slot
            .iter()
            .rposition(|v| !v.is_zero())
            .map_or(0, |last| last + 1);
        positions.push(P::from_index(lo)?);
        positions.push(P::from_index(lo + len)?);
    }
    Ok(positions)
}

/// Exactly `len` elements of `buf`: a borrowed prefix, or a copy padded with `fill`
fn realloc_or_sub_view<X: Clone>(buf: &[X], len: usize, fill: X) -> Cow<'_, [X]> {
    if len <= buf.len() {
        Cow::Borrowed(&buf[..len])
    } else {
        let mut grown = buf.to_vec();
        grown.resize(len, fill);
        Cow::Owned(grown)
    }
}

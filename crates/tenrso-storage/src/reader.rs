//! Loading storage from an external coordinate reader
//!
//! A [`CooReader`] reports the tensor's dimension sizes and entry count up
//! front, then fills caller-provided coordinate and value buffers in one call.
//! [`SparseStorage::from_reader`] allocates exactly for that count, reads
//! straight into the COO buffers, sorts them if needed and drops the reader.
//!
//! # Examples
//!
//! ```
//! use tenrso_storage::{DimSize, InMemoryReader, LevelScheme, SparseStorage};
//!
//! let reader = InMemoryReader::new(
//!     vec![3, 3],
//!     vec![(vec![2, 0], 3.0), (vec![0, 1], 1.0)],
//! )
//! .unwrap();
//! let scheme = LevelScheme::coo(vec![DimSize::Dynamic, DimSize::Static(3)]).unwrap();
//! let coo = SparseStorage::<f64>::from_reader(scheme, reader).unwrap();
//!
//! assert_eq!(coo.coordinates_buffer(), &[0, 1, 2, 0]);
//! assert_eq!(coo.values(), &[1.0, 3.0]);
//! ```

use scirs2_core::numeric::Num;

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::index::IndexType;
use crate::level::LevelScheme;
use crate::storage::SparseStorage;

/// Source of a coordinate list with known size
pub trait CooReader<T, C> {
    /// Sizes of every dimension, in dimension order
    fn dim_sizes(&self) -> &[usize];

    /// Number of stored entries the reader will produce
    fn nse(&self) -> usize;

    /// Writes `nse()` level-ordered coordinate tuples and values.
    ///
    /// `dim_to_lvl` maps each dimension to the tuple slot that receives it.
    /// Returns true if the tuples were produced in ascending order.
    fn read_to_buffers(
        &mut self,
        dim_to_lvl: &[usize],
        coordinates: &mut [C],
        values: &mut [T],
    ) -> StorageResult<bool>;
}

/// Reader over entries held in memory, in dimension order
#[derive(Debug, Clone)]
pub struct InMemoryReader<T> {
    dim_sizes: Vec<usize>,
    entries: Vec<(Vec<usize>, T)>,
}

impl<T: Copy> InMemoryReader<T> {
    /// Creates a reader, checking every entry against `dim_sizes`
    pub fn new(dim_sizes: Vec<usize>, entries: Vec<(Vec<usize>, T)>) -> StorageResult<Self> {
        for (coords, _) in &entries {
            if coords.len() != dim_sizes.len() {
                return Err(StorageError::RankMismatch {
                    expected: dim_sizes.len(),
                    got: coords.len(),
                });
            }
            if let Some((d, &c)) = coords
                .iter()
                .enumerate()
                .find(|&(d, &c)| c >= dim_sizes[d])
            {
                return Err(StorageError::reader(format!(
                    "coordinate {} out of bounds for dimension {} of size {}",
                    c, d, dim_sizes[d]
                )));
            }
        }
        Ok(Self { dim_sizes, entries })
    }
}

impl<T: Copy, C: IndexType> CooReader<T, C> for InMemoryReader<T> {
    fn dim_sizes(&self) -> &[usize] {
        &self.dim_sizes
    }

    fn nse(&self) -> usize {
        self.entries.len()
    }

    fn read_to_buffers(
        &mut self,
        dim_to_lvl: &[usize],
        coordinates: &mut [C],
        values: &mut [T],
    ) -> StorageResult<bool> {
        write_entries(
            self.entries.iter().map(|(c, v)| (c.as_slice(), *v)),
            dim_to_lvl,
            coordinates,
            values,
        )
    }
}

/// Writes dimension-ordered entries as level-ordered tuples, tracking whether
/// they arrive sorted
pub(crate) fn write_entries<'e, T, C, I>(
    entries: I,
    dim_to_lvl: &[usize],
    coordinates: &mut [C],
    values: &mut [T],
) -> StorageResult<bool>
where
    T: Copy,
    C: IndexType,
    I: IntoIterator<Item = (&'e [usize], T)>,
{
    let rank = dim_to_lvl.len();
    let mut sorted = true;
    let mut n = 0;
    for (i, (dim_coords, value)) in entries.into_iter().enumerate() {
        if i >= values.len() {
            return Err(StorageError::reader("more entries than announced"));
        }
        let tuple = &mut coordinates[i * rank..(i + 1) * rank];
        for (d, &c) in dim_coords.iter().enumerate() {
            tuple[dim_to_lvl[d]] = C::from_index(c)?;
        }
        if i > 0 && sorted {
            let prev = &coordinates[(i - 1) * rank..i * rank];
            sorted = prev <= &coordinates[i * rank..(i + 1) * rank];
        }
        values[i] = value;
        n = i + 1;
    }
    if n != values.len() {
        return Err(StorageError::LengthMismatch {
            what: "reader entries",
            expected: values.len(),
            got: n,
        });
    }
    Ok(sorted)
}

/// Sorts row-major coordinate tuples of length `rank` lexicographically,
/// permuting `values` along. Equal tuples keep their relative order.
pub fn sort_coo<T: Copy, C: IndexType>(
    rank: usize,
    coordinates: &mut [C],
    values: &mut [T],
) -> StorageResult<()> {
    let nse = values.len();
    if coordinates.len() != nse * rank {
        return Err(StorageError::LengthMismatch {
            what: "coordinates",
            expected: nse * rank,
            got: coordinates.len(),
        });
    }
    let tuples: &[C] = coordinates;
    let tuple = move |i: usize| &tuples[i * rank..(i + 1) * rank];
    let mut perm: Vec<usize> = (0..nse).collect();
    perm.sort_by(|&a, &b| tuple(a).cmp(tuple(b)));

    let sorted_crd: Vec<C> = perm.iter().flat_map(|&i| tuple(i).iter().copied()).collect();
    let sorted_values: Vec<T> = perm.iter().map(|&i| values[i]).collect();
    coordinates.copy_from_slice(&sorted_crd);
    values.copy_from_slice(&sorted_values);
    Ok(())
}

impl<T, P, C> SparseStorage<'static, T, P, C>
where
    T: Num + Copy,
    P: IndexType,
    C: IndexType,
{
    /// Builds a COO instance from `reader`, consuming it.
    ///
    /// Dynamic dimension sizes are taken from the reader. The buffers are
    /// sized for exactly `reader.nse()` entries, and sorted when the last
    /// level is ordered but the reader reports unsorted data.
    ///
    /// # Errors
    ///
    /// - the scheme is not a COO scheme from level 0
    /// - the reader's dimension count or static sizes disagree with the scheme
    /// - the reader fails or produces a different number of entries
    #[tracing::instrument(skip_all, fields(scheme = %scheme))]
    pub fn from_reader<R>(scheme: LevelScheme, mut reader: R) -> StorageResult<Self>
    where
        R: CooReader<T, C>,
    {
        if !scheme.is_coo_shape(0, false) {
            return Err(StorageError::not_coo(format!(
                "cannot read into {}",
                scheme
            )));
        }
        let reader_sizes = reader.dim_sizes().to_vec();
        if reader_sizes.len() != scheme.dim_rank() {
            return Err(StorageError::RankMismatch {
                expected: scheme.dim_rank(),
                got: reader_sizes.len(),
            });
        }
        let mut dyn_sizes = Vec::with_capacity(scheme.num_dynamic_dims());
        for (d, &sz) in reader_sizes.iter().enumerate() {
            match scheme.static_dim_size(d) {
                Some(expected) if expected != sz => {
                    return Err(StorageError::reader(format!(
                        "dimension {} has size {} but the scheme declares {}",
                        d, sz, expected
                    )));
                }
                Some(_) => {}
                None => dyn_sizes.push(sz),
            }
        }

        let nse = reader.nse();
        let rank = scheme.lvl_rank();
        let ordered = scheme.is_ordered_level(rank - 1);
        let mut storage =
            Self::allocate_with_config(scheme, &dyn_sizes, Some(nse), StorageConfig::default())?;

        let mut coordinates = vec![C::default(); nse * rank];
        let mut values = vec![T::zero(); nse];
        let sorted =
            reader.read_to_buffers(storage.scheme.dim_to_lvl(), &mut coordinates, &mut values)?;
        drop(reader);
        if !sorted && ordered {
            sort_coo(rank, &mut coordinates, &mut values)?;
        }

        storage.store_position(0, 1, nse)?;
        storage.specifier.set_crd_mem_size(0, coordinates.len());
        storage.specifier.set_val_mem_size(nse);
        storage.buffers.coordinates[0] = Some(coordinates.into());
        storage.buffers.values = values.into();

        tracing::debug!(nse, sorted, "read coordinate list");
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::{DimSize, LevelType};

    fn s(n: usize) -> DimSize {
        DimSize::Static(n)
    }

    #[test]
    fn test_sort_coo_is_lexicographic() {
        let mut coords = vec![2usize, 0, 0, 1, 0, 0, 1, 1];
        let mut values = vec![4.0, 2.0, 1.0, 3.0];
        sort_coo(2, &mut coords, &mut values).unwrap();
        assert_eq!(coords, vec![0, 0, 0, 1, 1, 1, 2, 0]);
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_from_reader_sorts_unsorted_input() {
        let reader = InMemoryReader::new(
            vec![4, 4],
            vec![(vec![3, 3], 3.0), (vec![0, 2], 1.0), (vec![1, 0], 2.0)],
        )
        .unwrap();
        let scheme = LevelScheme::coo(vec![s(4), s(4)]).unwrap();
        let coo = SparseStorage::<f64>::from_reader(scheme, reader).unwrap();
        assert_eq!(coo.positions(0), &[0, 3]);
        assert_eq!(coo.coordinates(0).to_vec(), vec![0, 1, 3]);
        assert_eq!(coo.coordinates(1).to_vec(), vec![2, 0, 3]);
        assert_eq!(coo.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_from_reader_permutes_into_level_order() {
        let reader =
            InMemoryReader::new(vec![2, 3], vec![(vec![1, 0], 1.0), (vec![0, 2], 2.0)]).unwrap();
        let scheme = LevelScheme::new(
            vec![LevelType::compressed(true, false), LevelType::SINGLETON],
            vec![1, 0],
            vec![s(2), s(3)],
        )
        .unwrap();
        let coo = SparseStorage::<f64>::from_reader(scheme, reader).unwrap();
        // Level 0 holds columns.
        assert_eq!(coo.coordinates_buffer(), &[0, 1, 2, 0]);
        assert_eq!(coo.values(), &[1.0, 2.0]);
        assert_eq!(coo.dim_sizes(), vec![2, 3]);
    }

    #[test]
    fn test_from_reader_keeps_order_for_unordered_level() {
        let reader =
            InMemoryReader::new(vec![3], vec![(vec![2], 1.0), (vec![0], 2.0)]).unwrap();
        let scheme =
            LevelScheme::identity(vec![LevelType::compressed(false, true)], vec![s(3)]).unwrap();
        let coo = SparseStorage::<f64>::from_reader(scheme, reader).unwrap();
        assert_eq!(coo.coordinates(0).to_vec(), vec![2, 0]);
    }

    #[test]
    fn test_from_reader_rejects_mismatched_sizes() {
        let reader = InMemoryReader::new(vec![5, 4], vec![]).unwrap();
        let scheme = LevelScheme::coo(vec![s(4), s(4)]).unwrap();
        let err = SparseStorage::<f64>::from_reader(scheme, reader).unwrap_err();
        assert!(matches!(err, StorageError::Reader(_)));

        let reader = InMemoryReader::<f64>::new(vec![4, 4], vec![]).unwrap();
        let err = SparseStorage::<f64>::from_reader(LevelScheme::csr(s(4), s(4)), reader)
            .unwrap_err();
        assert!(matches!(err, StorageError::NotCoo { .. }));
    }

    #[test]
    fn test_in_memory_reader_bounds() {
        let err = InMemoryReader::new(vec![2, 2], vec![(vec![2, 0], 1.0)]).unwrap_err();
        assert!(matches!(err, StorageError::Reader(_)));
    }
}

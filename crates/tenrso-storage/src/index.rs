//! Fixed-width index types for position and coordinate buffers

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::{StorageError, StorageResult};

/// Unsigned integer type usable for positions and coordinates
///
/// Storage is generic over its position type `P` and coordinate type `C` so
/// that compact encodings (e.g. `u32` coordinates) can be chosen per tensor.
pub trait IndexType: Copy + Default + Ord + Hash + Debug + Send + Sync + 'static {
    /// Bit width of the type
    const BITS: u32;

    /// Widens to `usize`
    fn to_index(self) -> usize;

    /// Narrows from `usize`, returning `None` if the value does not fit
    fn try_from_index(value: usize) -> Option<Self>;

    /// Narrows from `usize`, reporting an overflow error if the value does not fit
    #[inline]
    fn from_index(value: usize) -> StorageResult<Self> {
        Self::try_from_index(value).ok_or(StorageError::IndexOverflow {
            value,
            bits: Self::BITS,
        })
    }
}

macro_rules! impl_index_type {
    ($($t:ty),*) => {
        $(
            impl IndexType for $t {
                const BITS: u32 = <$t>::BITS;

                #[inline]
                fn to_index(self) -> usize {
                    self as usize
                }

                #[inline]
                fn try_from_index(value: usize) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }
            }
        )*
    };
}

impl_index_type!(u8, u16, u32, u64, usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrowing() {
        assert_eq!(u8::from_index(255).unwrap(), 255u8);
        let err = u8::from_index(256).unwrap_err();
        assert!(matches!(
            err,
            StorageError::IndexOverflow { value: 256, bits: 8 }
        ));
        assert_eq!(u32::try_from_index(70_000), Some(70_000u32));
        assert_eq!(u16::try_from_index(70_000), None);
    }

    #[test]
    fn test_widening() {
        assert_eq!(42u16.to_index(), 42usize);
        assert_eq!(usize::BITS, <usize as IndexType>::BITS);
    }
}

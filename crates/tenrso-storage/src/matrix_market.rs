//! Matrix Market coordinate files
//!
//! [`MatrixMarketReader`] is a [`CooReader`] over the
//! [Matrix Market](https://math.nist.gov/MatrixMarket/) exchange format:
//!
//! - A header line: `%%MatrixMarket matrix coordinate real general`
//! - Optional comment lines starting with `%`
//! - Size line: `nrows ncols nnz`
//! - Data lines: `row col value` (1-indexed)
//!
//! Symmetric and skew-symmetric files are expanded while reading, so
//! [`CooReader::nse`] counts the mirrored entries too.
//!
//! # Examples
//!
//! ```
//! use std::io::Cursor;
//! use tenrso_storage::{DimSize, LevelScheme, MatrixMarketReader, SparseStorage};
//!
//! let data = b"%%MatrixMarket matrix coordinate real general
//! 3 3 3
//! 1 1 1.0
//! 2 2 2.0
//! 3 1 3.0
//! ";
//! let reader = MatrixMarketReader::<f64>::from_reader(Cursor::new(data)).unwrap();
//! let scheme = LevelScheme::coo(vec![DimSize::Dynamic, DimSize::Dynamic]).unwrap();
//! let coo = SparseStorage::<f64>::from_reader(scheme, reader).unwrap();
//!
//! assert_eq!(coo.dim_sizes(), vec![3, 3]);
//! assert_eq!(coo.coordinates(0).to_vec(), vec![0, 1, 2]);
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::str::FromStr;

use scirs2_core::numeric::Num;

use crate::error::{StorageError, StorageResult};
use crate::index::IndexType;
use crate::reader::{write_entries, CooReader};
use crate::storage::SparseStorage;

/// Matrix Market data type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMarketDataType {
    Real,
    Integer,
    /// Structure only; every entry reads as one
    Pattern,
}

/// Matrix Market symmetry type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMarketSymmetry {
    General,
    Symmetric,
    SkewSymmetric,
}

/// Header of a coordinate Matrix Market file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixMarketHeader {
    pub data_type: MatrixMarketDataType,
    pub symmetry: MatrixMarketSymmetry,
}

impl MatrixMarketHeader {
    /// Parse header from first line
    pub fn parse(line: &str) -> StorageResult<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 || parts[0] != "%%MatrixMarket" || parts[1] != "matrix" {
            return Err(StorageError::reader("Invalid Matrix Market header format"));
        }
        if parts[2] != "coordinate" {
            return Err(StorageError::reader(format!(
                "Only coordinate format is supported, got {}",
                parts[2]
            )));
        }

        let data_type = match parts[3] {
            "real" => MatrixMarketDataType::Real,
            "integer" => MatrixMarketDataType::Integer,
            "pattern" => MatrixMarketDataType::Pattern,
            other => {
                return Err(StorageError::reader(format!(
                    "Unsupported data type: {}",
                    other
                )))
            }
        };

        let symmetry = match parts[4] {
            "general" => MatrixMarketSymmetry::General,
            "symmetric" => MatrixMarketSymmetry::Symmetric,
            "skew-symmetric" => MatrixMarketSymmetry::SkewSymmetric,
            other => {
                return Err(StorageError::reader(format!(
                    "Unsupported symmetry: {}",
                    other
                )))
            }
        };

        Ok(Self {
            data_type,
            symmetry,
        })
    }

    /// Convert to header line string
    pub fn header_string(&self) -> String {
        let data_type_str = match self.data_type {
            MatrixMarketDataType::Real => "real",
            MatrixMarketDataType::Integer => "integer",
            MatrixMarketDataType::Pattern => "pattern",
        };
        let symmetry_str = match self.symmetry {
            MatrixMarketSymmetry::General => "general",
            MatrixMarketSymmetry::Symmetric => "symmetric",
            MatrixMarketSymmetry::SkewSymmetric => "skew-symmetric",
        };
        format!(
            "%%MatrixMarket matrix coordinate {} {}",
            data_type_str, symmetry_str
        )
    }
}

/// Coordinate reader over a parsed Matrix Market file
#[derive(Debug, Clone)]
pub struct MatrixMarketReader<T> {
    header: MatrixMarketHeader,
    dim_sizes: Vec<usize>,
    entries: Vec<([usize; 2], T)>,
}

impl<T> MatrixMarketReader<T>
where
    T: Num + Copy + FromStr,
{
    /// Opens and parses the file at `path`
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Parses a Matrix Market stream
    ///
    /// # Complexity
    ///
    /// O(nnz) for reading and parsing
    pub fn from_reader(reader: impl Read) -> StorageResult<Self> {
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        reader.read_line(&mut line)?;
        let header = MatrixMarketHeader::parse(line.trim())?;

        // Skip comment lines
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(StorageError::reader("Missing size line"));
            }
            if !line.trim().starts_with('%') {
                break;
            }
        }

        let size_parts: Vec<&str> = line.split_whitespace().collect();
        if size_parts.len() != 3 {
            return Err(StorageError::reader("Invalid size line format"));
        }
        let nrows = parse_usize(size_parts[0], "nrows")?;
        let ncols = parse_usize(size_parts[1], "ncols")?;
        let nnz = parse_usize(size_parts[2], "nnz")?;

        let mut entries = Vec::with_capacity(nnz);
        for _ in 0..nnz {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(StorageError::reader(format!(
                    "Expected {} entries, found {}",
                    nnz,
                    entries.len()
                )));
            }
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                return Err(StorageError::reader("Invalid data line format"));
            }

            // Matrix Market uses 1-based indexing
            let row = one_based(parts[0], nrows, "row")?;
            let col = one_based(parts[1], ncols, "column")?;

            let value = if header.data_type == MatrixMarketDataType::Pattern {
                T::one()
            } else {
                let raw = parts
                    .get(2)
                    .ok_or_else(|| StorageError::reader("Missing value in data line"))?;
                raw.parse::<T>()
                    .map_err(|_| StorageError::reader(format!("Invalid value: {}", raw)))?
            };

            entries.push(([row, col], value));
            if row != col {
                match header.symmetry {
                    MatrixMarketSymmetry::General => {}
                    MatrixMarketSymmetry::Symmetric => entries.push(([col, row], value)),
                    MatrixMarketSymmetry::SkewSymmetric => {
                        entries.push(([col, row], T::zero() - value))
                    }
                }
            }
        }

        tracing::debug!(nrows, ncols, nse = entries.len(), "parsed Matrix Market file");
        Ok(Self {
            header,
            dim_sizes: vec![nrows, ncols],
            entries,
        })
    }

    pub fn header(&self) -> MatrixMarketHeader {
        self.header
    }
}

fn parse_usize(raw: &str, what: &str) -> StorageResult<usize> {
    raw.parse()
        .map_err(|_| StorageError::reader(format!("Invalid {}: {}", what, raw)))
}

fn one_based(raw: &str, size: usize, what: &str) -> StorageResult<usize> {
    let idx = parse_usize(raw, what)?;
    if idx == 0 || idx > size {
        return Err(StorageError::reader(format!(
            "{} index {} outside 1..={}",
            what, idx, size
        )));
    }
    Ok(idx - 1)
}

impl<T: Copy, C: IndexType> CooReader<T, C> for MatrixMarketReader<T> {
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
            self.entries.iter().map(|(c, v)| (&c[..], *v)),
            dim_to_lvl,
            coordinates,
            values,
        )
    }
}

/// Writes a rank-2 COO instance as a general Matrix Market file
///
/// # Complexity
///
/// O(nnz) for writing
pub fn write_matrix_market<T, P, C>(
    storage: &SparseStorage<'_, T, P, C>,
    writer: &mut impl Write,
) -> StorageResult<()>
where
    T: Num + Copy + std::fmt::Display,
    P: IndexType,
    C: IndexType,
{
    if storage.dim_rank() != 2 {
        return Err(StorageError::RankMismatch {
            expected: 2,
            got: storage.dim_rank(),
        });
    }
    let unpacked = storage.unpack(None)?;
    let header = MatrixMarketHeader {
        data_type: MatrixMarketDataType::Real,
        symmetry: MatrixMarketSymmetry::General,
    };

    writeln!(writer, "{}", header.header_string())?;
    let dims = storage.dim_sizes();
    writeln!(writer, "{} {} {}", dims[0], dims[1], unpacked.count)?;

    let (row_lvl, col_lvl) = (storage.scheme().to_lvl(0), storage.scheme().to_lvl(1));
    for (tuple, val) in unpacked
        .coordinates
        .chunks_exact(2)
        .zip(unpacked.values.iter())
    {
        // Convert to 1-based
        let row = tuple[row_lvl].to_index() + 1;
        let col = tuple[col_lvl].to_index() + 1;
        writeln!(writer, "{} {} {}", row, col, val)?;
    }
    Ok(())
}

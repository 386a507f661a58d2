//! End-to-end storage scenarios
//!
//! Each test builds a tensor through the public API and checks the exact
//! buffer contents of the resulting level format.

use std::io::Cursor;

use tenrso_storage::{
    write_matrix_market, DimSize, DimSlice, InMemoryReader, LevelScheme, LevelType,
    MatrixMarketReader, SparseStorage, StorageError,
};

fn s(n: usize) -> DimSize {
    DimSize::Static(n)
}

// ============================================================================
// Ordered insertion
// ============================================================================

#[test]
fn test_csr_build_with_empty_middle_row() {
    let mut csr = SparseStorage::<f64>::allocate(LevelScheme::csr(s(3), s(3)), &[], None).unwrap();
    csr.insert(&[0, 0], 1.0).unwrap();
    csr.insert(&[0, 2], 2.0).unwrap();
    csr.insert(&[2, 1], 3.0).unwrap();
    csr.finalize().unwrap();

    assert_eq!(csr.positions(0), &[] as &[usize]);
    assert_eq!(csr.positions(1), &[0, 2, 2, 3]);
    assert_eq!(csr.coordinates(1).to_vec(), vec![0, 2, 1]);
    assert_eq!(csr.values(), &[1.0, 2.0, 3.0]);
    assert_eq!(csr.number_of_entries(), 3);
}

#[test]
fn test_dcsr_stores_only_nonempty_rows() {
    let mut dcsr =
        SparseStorage::<f64>::allocate(LevelScheme::dcsr(s(4), s(4)), &[], Some(2)).unwrap();
    dcsr.insert(&[1, 3], 2.0).unwrap();
    dcsr.insert(&[3, 0], 5.0).unwrap();
    dcsr.finalize().unwrap();

    assert_eq!(dcsr.positions(0), &[0, 2]);
    assert_eq!(dcsr.coordinates(0).to_vec(), vec![1, 3]);
    assert_eq!(dcsr.positions(1), &[0, 1, 2]);
    assert_eq!(dcsr.coordinates(1).to_vec(), vec![3, 0]);
    assert_eq!(dcsr.values(), &[2.0, 5.0]);
}

#[test]
fn test_csc_inserts_in_dimension_order() {
    let mut csc = SparseStorage::<f64>::allocate(LevelScheme::csc(s(3), s(3)), &[], None).unwrap();
    // Column-major arrival: (row, col)
    csc.insert_dims(&[1, 0], 1.0).unwrap();
    csc.insert_dims(&[0, 2], 2.0).unwrap();
    csc.insert_dims(&[2, 2], 3.0).unwrap();
    csc.finalize().unwrap();

    assert_eq!(csc.positions(1), &[0, 1, 1, 3]);
    assert_eq!(csc.coordinates(1).to_vec(), vec![1, 0, 2]);
    assert_eq!(csc.dim_sizes(), vec![3, 3]);
}

#[test]
fn test_coo_shares_one_coordinate_buffer() {
    let scheme = LevelScheme::coo(vec![s(2), s(3), s(4)]).unwrap();
    let mut coo = SparseStorage::<f64>::allocate(scheme, &[], Some(3)).unwrap();
    coo.insert(&[0, 1, 2], 1.0).unwrap();
    coo.insert(&[0, 1, 3], 2.0).unwrap();
    coo.insert(&[1, 0, 0], 3.0).unwrap();
    coo.finalize().unwrap();

    assert_eq!(coo.positions(0), &[0, 3]);
    assert_eq!(coo.coordinates_buffer(), &[0, 1, 2, 0, 1, 3, 1, 0, 0]);
    assert_eq!(coo.coordinates(1).stride(), 3);
    assert_eq!(coo.coordinates(2).to_vec(), vec![2, 3, 0]);
}

#[test]
fn test_dense_tail_block_per_compressed_entry() {
    let scheme = LevelScheme::identity(
        vec![LevelType::DENSE, LevelType::COMPRESSED, LevelType::DENSE],
        vec![s(2), s(3), s(2)],
    )
    .unwrap();
    let mut t = SparseStorage::<f64>::allocate(scheme, &[], None).unwrap();
    t.insert(&[0, 1, 0], 1.0).unwrap();
    t.insert(&[0, 1, 1], 2.0).unwrap();
    t.insert(&[1, 2, 1], 3.0).unwrap();
    t.finalize().unwrap();

    assert_eq!(t.positions(1), &[0, 1, 2]);
    assert_eq!(t.coordinates(1).to_vec(), vec![1, 2]);
    assert_eq!(t.values(), &[1.0, 2.0, 0.0, 3.0]);
}

#[test]
fn test_dynamic_sizes_come_from_arguments() {
    let scheme = LevelScheme::csr(DimSize::Dynamic, s(5));
    let csr = SparseStorage::<f32>::allocate(scheme.clone(), &[7], None).unwrap();
    assert_eq!(csr.dim_sizes(), vec![7, 5]);
    assert_eq!(csr.positions(1).len(), 8);

    let err = SparseStorage::<f32>::allocate(scheme, &[], None).unwrap_err();
    assert!(matches!(err, StorageError::DynamicSizeMismatch { expected: 1, found: 0 }));
}

#[test]
fn test_append_violations_leave_storage_unchanged() {
    let mut csr = SparseStorage::<f64>::allocate(LevelScheme::csr(s(3), s(3)), &[], None).unwrap();
    csr.insert(&[0, 2], 1.0).unwrap();
    csr.insert(&[1, 0], 2.0).unwrap();
    let before = csr.to_owned_storage();

    // Re-inserting the most recent tuple is an overwrite, not a violation
    csr.insert(&[1, 0], 9.0).unwrap();

    let err = csr.insert(&[0, 1], 3.0).unwrap_err();
    assert!(matches!(err, StorageError::OutOfOrder { level: 1, .. }));

    let err = csr.insert(&[3, 0], 3.0).unwrap_err();
    assert!(matches!(err, StorageError::CoordinateOutOfBounds { level: 0, .. }));
    assert!(err.is_contract_violation());

    let err = csr.insert(&[1], 3.0).unwrap_err();
    assert!(matches!(err, StorageError::RankMismatch { expected: 2, got: 1 }));

    // Only the overwrite of (1, 0) went through.
    assert_eq!(csr.positions(1), before.positions(1));
    assert_eq!(csr.coordinates(1).to_vec(), before.coordinates(1).to_vec());
    assert_eq!(csr.values(), &[1.0, 9.0]);
}

// ============================================================================
// Expand / compress
// ============================================================================

#[test]
fn test_expand_compress_accumulates_row() {
    let mut csr = SparseStorage::<f64>::allocate(LevelScheme::csr(s(2), s(4)), &[], None).unwrap();
    let mut access = csr.expand();
    access.add(3, 1.0).unwrap();
    access.add(1, 2.0).unwrap();
    access.add(3, 4.0).unwrap();
    csr.compress(&[1], &mut access).unwrap();
    csr.finalize().unwrap();

    assert_eq!(csr.positions(1), &[0, 0, 2]);
    assert_eq!(csr.coordinates(1).to_vec(), vec![1, 3]);
    assert_eq!(csr.values(), &[2.0, 5.0]);
    assert!(access.filled().iter().all(|f| !f));
}

// ============================================================================
// Pack / unpack
// ============================================================================

#[test]
fn test_pack_insert_after_borrow_copies() {
    let coords = vec![0usize, 1, 1, 0];
    let values = vec![1.0f64, 2.0];
    let mut coo: SparseStorage<f64> =
        SparseStorage::pack(LevelScheme::coo(vec![s(2), s(2)]).unwrap(), &[], &coords, &values)
            .unwrap();
    assert!(coo.is_borrowed());

    coo.insert(&[1, 1], 3.0).unwrap();
    assert_eq!(coo.values(), &[1.0, 2.0, 3.0]);
    assert_eq!(coo.coordinates_buffer(), &[0, 1, 1, 0, 1, 1]);
    assert_eq!(values, vec![1.0, 2.0]);

    let owned = coo.into_owned();
    assert!(!owned.is_borrowed());
}

#[test]
fn test_batched_pack_unpack() {
    let scheme = LevelScheme::batched_coo(vec![s(3)], vec![s(4)]).unwrap();
    // Three batches with two slots each
    let coords = [0usize, 2, 1, 3, 0, 1];
    let values = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
    let packed: SparseStorage<f64> =
        SparseStorage::pack_batched(scheme, &[], 1, &coords, &values).unwrap();
    assert_eq!(packed.positions(1), &[0, 2, 4, 6]);

    let out = packed.unpack_batched(1, None).unwrap();
    assert_eq!(out.count, 2);
    assert_eq!(&out.values[..], &values[..]);
    assert_eq!(&out.coordinates[..], &coords[..]);

    let padded = packed.unpack_batched(1, Some(3)).unwrap();
    assert_eq!(&padded.values[..], &[1.0, 2.0, 0.0, 3.0, 4.0, 0.0, 5.0, 6.0, 0.0]);
}

#[test]
fn test_batched_pack_requires_static_dense_batches() {
    let scheme = LevelScheme::batched_coo(vec![DimSize::Dynamic], vec![s(4)]).unwrap();
    let err =
        SparseStorage::<f64>::pack_batched(scheme, &[2], 1, &[0, 1], &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, StorageError::NotCoo { .. }));
}

// ============================================================================
// Readers
// ============================================================================

#[test]
fn test_matrix_market_round_trip() {
    let data = b"%%MatrixMarket matrix coordinate real general
% generated
4 5 3
4 1 7.5
1 2 1.25
2 5 -3
";
    let reader = MatrixMarketReader::<f64>::from_reader(Cursor::new(data)).unwrap();
    let scheme = LevelScheme::coo(vec![DimSize::Dynamic, DimSize::Dynamic]).unwrap();
    let coo = SparseStorage::<f64>::from_reader(scheme.clone(), reader).unwrap();

    assert_eq!(coo.dim_sizes(), vec![4, 5]);
    assert_eq!(coo.coordinates_buffer(), &[0, 1, 1, 4, 3, 0]);
    assert_eq!(coo.values(), &[1.25, -3.0, 7.5]);

    let mut text = Vec::new();
    write_matrix_market(&coo, &mut text).unwrap();
    let reread = MatrixMarketReader::<f64>::from_reader(Cursor::new(text)).unwrap();
    let again = SparseStorage::<f64>::from_reader(scheme, reread).unwrap();
    assert_eq!(again.coordinates_buffer(), coo.coordinates_buffer());
    assert_eq!(again.values(), coo.values());
}

#[test]
fn test_reader_into_narrow_index_types() {
    let reader = InMemoryReader::new(
        vec![300, 2],
        vec![(vec![299, 1], 1.0f32), (vec![5, 0], 2.0)],
    )
    .unwrap();
    let scheme = LevelScheme::coo(vec![s(300), s(2)]).unwrap();
    let coo = SparseStorage::<f32, u8, u16>::from_reader(scheme, reader).unwrap();
    assert_eq!(coo.positions(0), &[0u8, 2]);
    assert_eq!(coo.coordinates_buffer(), &[5u16, 0, 299, 1]);
}

// ============================================================================
// Conversion and views
// ============================================================================

#[test]
fn test_convert_then_slice() {
    let mut csr = SparseStorage::<f64>::allocate(LevelScheme::csr(s(4), s(4)), &[], None).unwrap();
    for i in 0..4 {
        csr.insert(&[i, i], (i + 1) as f64).unwrap();
    }
    csr.finalize().unwrap();

    let narrow = csr.convert::<f32, u32, u32>(csr.scheme()).unwrap();
    assert_eq!(narrow.positions(1), &[0u32, 1, 2, 3, 4]);
    assert_eq!(narrow.values(), &[1.0f32, 2.0, 3.0, 4.0]);

    let view = narrow
        .slice(&[DimSlice::new(1, 2, 2), DimSlice::new(0, 4, 1)])
        .unwrap();
    assert_eq!(view.dim_sizes(), vec![2, 4]);
    assert_eq!(view.slice_offset(0), 1);
    assert_eq!(view.slice_stride(0), 2);
    assert_eq!(view.positions(1), narrow.positions(1));

    let err = view.convert::<f64, usize, usize>(view.scheme()).unwrap_err();
    assert!(matches!(err, StorageError::IncompatibleSchemes { .. }));
}

#[test]
fn test_scheme_round_trips_through_json() {
    let scheme = LevelScheme::batched_coo(vec![s(2)], vec![DimSize::Dynamic, s(8)]).unwrap();
    let json = serde_json::to_string(&scheme).unwrap();
    let back: LevelScheme = serde_json::from_str(&json).unwrap();
    assert_eq!(back, scheme);
    assert_eq!(back.to_string(), scheme.to_string());
}

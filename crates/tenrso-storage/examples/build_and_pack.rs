//! Building and Exchanging Sparse Storage Example
//!
//! This example walks through the main storage operations:
//! - Building a CSR matrix by ordered insertion
//! - Building a row at once with expand/compress
//! - Packing a caller-owned COO list and unpacking it again
//! - Narrowing index widths and taking a slice view
//!
//! Run with: cargo run --example build_and_pack --features subscriber

use tenrso_storage::{DimSize, DimSlice, LevelScheme, SparseStorage};

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "subscriber")]
    tenrso_storage::logging::init_tracing(&tenrso_storage::logging::TracingConfig::from_env())?;

    println!("=== TenRSo Storage: Build and Pack Example ===\n");

    // 1. Ordered insertion into CSR
    println!("1. Inserting into a 4x4 CSR matrix...");
    let scheme = LevelScheme::csr(DimSize::Static(4), DimSize::Static(4));
    let mut csr = SparseStorage::<f64>::allocate(scheme.clone(), &[], None)?;
    csr.insert(&[0, 1], 1.0)?;
    csr.insert(&[0, 3], 2.0)?;
    csr.insert(&[3, 2], 3.0)?;
    csr.finalize()?;
    println!("   positions:   {:?}", csr.positions(1));
    println!("   coordinates: {:?}", csr.coordinates(1).to_vec());
    println!("   values:      {:?}\n", csr.values());

    // 2. Scatter one row, then compress it
    println!("2. Building a row with expand/compress...");
    let mut rows = SparseStorage::<f64>::allocate(scheme, &[], None)?;
    let mut access = rows.expand();
    for (j, v) in [(3, 1.0), (0, 2.0), (3, 0.5)] {
        access.add(j, v)?;
    }
    rows.compress(&[2], &mut access)?;
    rows.finalize()?;
    println!("   positions:   {:?}", rows.positions(1));
    println!("   values:      {:?}\n", rows.values());

    // 3. Pack a caller-owned list without copying
    println!("3. Packing a 3-D COO list...");
    let coords = vec![0usize, 0, 1, 0, 2, 0, 1, 1, 1];
    let values = vec![10.0f64, 20.0, 30.0];
    let coo_scheme =
        LevelScheme::coo(vec![DimSize::Static(2), DimSize::Static(3), DimSize::Static(2)])?;
    let coo: SparseStorage<f64> = SparseStorage::pack(coo_scheme, &[], &coords, &values)?;
    println!("   borrowed: {}", coo.is_borrowed());
    let unpacked = coo.unpack(Some(4))?;
    println!(
        "   unpacked {} entries into {} slots: {:?}\n",
        unpacked.count,
        unpacked.values.len(),
        unpacked.values
    );

    // 4. Narrow index widths, then view a window
    println!("4. Converting to u32 indices and slicing...");
    let narrow = csr.convert::<f32, u32, u32>(csr.scheme())?;
    let view = narrow.slice(&[DimSlice::new(0, 2, 3), DimSlice::full(4)])?;
    println!("   view dims: {:?}", view.dim_sizes());
    println!("   row stride: {}", view.slice_stride(0));

    Ok(())
}

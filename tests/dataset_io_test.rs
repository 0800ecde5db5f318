use std::fs::File;
use std::io::Write;

use annflow::error::{AnnflowError, Result};
use annflow::vector::io::{write_fvecs, write_ivecs};
use annflow::vector::{GroundTruth, Vector, VectorStore};
use byteorder::{LittleEndian, WriteBytesExt};
use tempfile::TempDir;

fn sample_vectors() -> Vec<Vector> {
    (0..6)
        .map(|i| Vector::new(vec![i as f32, i as f32 * 0.5, -(i as f32)]))
        .collect()
}

#[test]
fn fvecs_round_trip_preserves_ids_and_values() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("base.fvecs");
    write_fvecs(&path, &sample_vectors())?;

    let store = VectorStore::load(&path)?;
    assert_eq!(store.size(), 6);
    assert_eq!(store.dimension(), 3);
    assert_eq!(store.get(4)?.data, vec![4.0, 2.0, -4.0]);
    assert!(matches!(store.get(6), Err(AnnflowError::NotFound(_))));

    let limited = VectorStore::load_limit(&path, 2)?;
    assert_eq!(limited.size(), 2);
    Ok(())
}

#[test]
fn truncated_payload_is_a_format_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("truncated.fvecs");
    let mut file = File::create(&path)?;
    file.write_i32::<LittleEndian>(4)?;
    for value in [1.0f32, 2.0, 3.0] {
        file.write_f32::<LittleEndian>(value)?;
    }
    file.flush()?;

    assert!(matches!(
        VectorStore::load(&path),
        Err(AnnflowError::Format(_))
    ));
    Ok(())
}

#[test]
fn oversized_declared_dimension_is_a_format_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("oversized.fvecs");
    let mut file = File::create(&path)?;
    file.write_i32::<LittleEndian>(i32::MAX)?;
    file.write_f32::<LittleEndian>(1.0)?;
    file.flush()?;

    assert!(matches!(
        VectorStore::load(&path),
        Err(AnnflowError::Format(_))
    ));
    Ok(())
}

#[test]
fn truncated_header_is_a_format_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("header.fvecs");
    write_fvecs(&path, &sample_vectors()[..2])?;
    let mut file = std::fs::OpenOptions::new().append(true).open(&path)?;
    file.write_all(&[3, 0])?;
    file.flush()?;

    assert!(matches!(
        VectorStore::load(&path),
        Err(AnnflowError::Format(_))
    ));
    Ok(())
}

#[test]
fn inconsistent_dimensions_are_a_format_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("ragged.fvecs");
    write_fvecs(
        &path,
        &[Vector::new(vec![1.0, 2.0]), Vector::new(vec![1.0, 2.0, 3.0])],
    )?;

    assert!(matches!(
        VectorStore::load(&path),
        Err(AnnflowError::Format(_))
    ));
    Ok(())
}

#[test]
fn non_finite_values_are_a_format_error() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nan.fvecs");
    write_fvecs(&path, &[Vector::new(vec![1.0, f32::NAN])])?;

    assert!(matches!(
        VectorStore::load(&path),
        Err(AnnflowError::Format(_))
    ));
    Ok(())
}

#[test]
fn ground_truth_reads_ivecs_rows() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("groundtruth.ivecs");
    write_ivecs(&path, &[vec![3, 1, 2], vec![0, 2, 1]])?;

    let truth = GroundTruth::load(&path)?;
    assert_eq!(truth.len(), 2);
    assert_eq!(truth.ids(0), Some(&[3, 1, 2][..]));
    assert_eq!(truth.ids(1), Some(&[0, 2, 1][..]));
    assert_eq!(truth.ids(2), None);
    Ok(())
}

//! Readers and writers for the `.fvecs` / `.ivecs` vector file layout.
//!
//! Each record is a little-endian `i32` component count followed by that
//! many little-endian `f32` (`.fvecs`) or `i32` (`.ivecs`) values. All records
//! in a file share the same count.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{AnnflowError, Result};
use crate::vector::core::vector::Vector;

/// A component type that can appear in a vector record.
pub trait RecordComponent: Sized + Copy + Default {
    /// Read `buf.len()` little-endian values.
    fn read_into<R: io::Read>(reader: &mut R, buf: &mut [Self]) -> io::Result<()>;

    /// Write one little-endian value.
    fn write_one<W: io::Write>(writer: &mut W, value: Self) -> io::Result<()>;
}

impl RecordComponent for f32 {
    fn read_into<R: io::Read>(reader: &mut R, buf: &mut [Self]) -> io::Result<()> {
        reader.read_f32_into::<LittleEndian>(buf)
    }

    fn write_one<W: io::Write>(writer: &mut W, value: Self) -> io::Result<()> {
        writer.write_f32::<LittleEndian>(value)
    }
}

impl RecordComponent for i32 {
    fn read_into<R: io::Read>(reader: &mut R, buf: &mut [Self]) -> io::Result<()> {
        reader.read_i32_into::<LittleEndian>(buf)
    }

    fn write_one<W: io::Write>(writer: &mut W, value: Self) -> io::Result<()> {
        writer.write_i32::<LittleEndian>(value)
    }
}

/// Streaming reader over length-prefixed records.
///
/// Yields one `Vec<T>` per record and fails with a format error on the first
/// truncated or inconsistent record; iteration stops after an error.
pub struct RecordReader<R, T> {
    reader: R,
    dimension: Option<usize>,
    index: usize,
    failed: bool,
    _marker: PhantomData<T>,
}

/// Reader for `.fvecs` files.
pub type FvecsReader<R> = RecordReader<R, f32>;

/// Reader for `.ivecs` files.
pub type IvecsReader<R> = RecordReader<R, i32>;

impl<R: BufRead, T: RecordComponent> RecordReader<R, T> {
    /// Wrap a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            dimension: None,
            index: 0,
            failed: false,
            _marker: PhantomData,
        }
    }

    /// The record dimension, known after the first record has been read.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn read_record(&mut self) -> Result<Option<Vec<T>>> {
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let declared = match self.reader.read_i32::<LittleEndian>() {
            Ok(value) => value,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(AnnflowError::format(format!(
                    "record {} has a truncated header",
                    self.index
                )));
            }
            Err(e) => return Err(e.into()),
        };

        if declared <= 0 {
            return Err(AnnflowError::format(format!(
                "record {} declares invalid dimension {declared}",
                self.index
            )));
        }
        let dimension = declared as usize;

        match self.dimension {
            Some(expected) if expected != dimension => {
                return Err(AnnflowError::format(format!(
                    "record {} has dimension {dimension}, expected {expected}",
                    self.index
                )));
            }
            None => self.dimension = Some(dimension),
            _ => {}
        }

        // The header is untrusted; buffer only the bytes that actually arrive.
        let payload_len = dimension
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| {
                AnnflowError::format(format!(
                    "record {} declares oversized dimension {dimension}",
                    self.index
                ))
            })?;
        let mut payload = Vec::new();
        (&mut self.reader)
            .take(payload_len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() < payload_len {
            return Err(AnnflowError::format(format!(
                "record {} is truncated: declares {dimension} values but only {} bytes remain",
                self.index,
                payload.len()
            )));
        }

        let mut values = vec![T::default(); dimension];
        T::read_into(&mut payload.as_slice(), &mut values)?;

        self.index += 1;
        Ok(Some(values))
    }
}

impl<R: BufRead, T: RecordComponent> Iterator for RecordReader<R, T> {
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Open an `.fvecs` file for streaming.
pub fn open_fvecs<P: AsRef<Path>>(path: P) -> Result<FvecsReader<BufReader<File>>> {
    Ok(RecordReader::new(BufReader::new(File::open(path)?)))
}

/// Open an `.ivecs` file for streaming.
pub fn open_ivecs<P: AsRef<Path>>(path: P) -> Result<IvecsReader<BufReader<File>>> {
    Ok(RecordReader::new(BufReader::new(File::open(path)?)))
}

/// Read up to `limit` vectors from an `.fvecs` file.
pub fn read_fvecs<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<Vec<Vector>> {
    open_fvecs(path)?
        .take(limit.unwrap_or(usize::MAX))
        .map(|record| record.map(Vector::new))
        .collect()
}

/// Read up to `limit` integer records from an `.ivecs` file.
pub fn read_ivecs<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<Vec<Vec<i32>>> {
    open_ivecs(path)?
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Write records in the length-prefixed layout.
pub fn write_records<W, T, V>(writer: W, records: &[V]) -> Result<()>
where
    W: Write,
    T: RecordComponent,
    V: AsRef<[T]>,
{
    let mut writer = BufWriter::new(writer);
    for record in records {
        let values = record.as_ref();
        let dimension = i32::try_from(values.len())
            .map_err(|_| AnnflowError::format("record too long for i32 header"))?;
        writer.write_i32::<LittleEndian>(dimension)?;
        for &value in values {
            T::write_one(&mut writer, value)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write vectors to an `.fvecs` file.
pub fn write_fvecs<P: AsRef<Path>>(path: P, vectors: &[Vector]) -> Result<()> {
    write_records::<_, f32, _>(File::create(path)?, vectors)
}

/// Write integer records to an `.ivecs` file.
pub fn write_ivecs<P: AsRef<Path>>(path: P, records: &[Vec<i32>]) -> Result<()> {
    write_records::<_, i32, _>(File::create(path)?, records)
}

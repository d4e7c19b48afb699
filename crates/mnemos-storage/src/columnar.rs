//! Columnar encoding: one binary container holding two named, typed datasets.
//!
//! # Layout (all integers little-endian)
//!
//! | Part | Encoding |
//! |------|----------|
//! | magic | `MNCOL\0` |
//! | version | `u8` |
//! | dataset count | `u32` |
//! | per dataset | name (`u16` len + UTF-8), dtype (`u8`), rank (`u8`), shape (`u64` x rank), [fields], payload (`u64` len + bytes) |
//!
//! `embeddings` has dtype `F32` and shape `[count, D]`; its payload is the
//! row-major vector buffer. `metadata` has dtype `FixedText` and shape
//! `[count]`, followed by its field list (`u16` count, then name + `u32`
//! byte width per field). Each metadata row is the concatenation of its
//! fields, every value NUL-padded to the field width. Widths are the widest
//! value seen at save time, so nothing is ever truncated.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::info;

use mnemos_core::error::{MnemosError, Result};
use mnemos_core::types::{Record, RECORD_FIELDS};

use crate::atomic::{require_file, write_atomic};
use crate::store::MemoryStore;

const MAGIC: &[u8; 6] = b"MNCOL\0";
const VERSION: u8 = 1;

const EMBEDDINGS: &str = "embeddings";
const METADATA: &str = "metadata";

/// Element type of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum DType {
    F32 = 0x01,
    FixedText = 0x02,
}

impl DType {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::F32),
            0x02 => Some(Self::FixedText),
            _ => None,
        }
    }
}

/// A dataset as read back from disk, before interpretation.
#[derive(Debug)]
struct Dataset<'a> {
    dtype: DType,
    shape: Vec<u64>,
    fields: Vec<(String, usize)>,
    payload: &'a [u8],
}

pub(crate) fn save(store: &MemoryStore, path: &Path) -> Result<()> {
    let bytes = encode(store)?;
    write_atomic(path, |w| {
        w.write_all(&bytes)?;
        Ok(())
    })?;

    info!(
        path = %path.display(),
        count = store.len(),
        bytes = bytes.len(),
        "Saved memory store as columnar container"
    );
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<MemoryStore> {
    require_file(path)?;
    let bytes = fs::read(path)?;
    let store = decode(&bytes)?;

    info!(
        path = %path.display(),
        count = store.len(),
        "Loaded memory store from columnar container"
    );
    Ok(store)
}

fn encode(store: &MemoryStore) -> Result<Vec<u8>> {
    let count = store.len() as u64;
    let dimension = store.dimension().unwrap_or(0) as u64;

    let mut out = Vec::with_capacity(64 + store.raw_vectors().len() * 4);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&2u32.to_le_bytes());

    // embeddings
    put_str(&mut out, EMBEDDINGS)?;
    out.push(DType::F32 as u8);
    out.push(2);
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&dimension.to_le_bytes());
    let raw = store.raw_vectors();
    out.extend_from_slice(&((raw.len() * 4) as u64).to_le_bytes());
    for value in raw {
        out.extend_from_slice(&value.to_le_bytes());
    }

    // metadata
    let widths = field_widths(store.records());
    put_str(&mut out, METADATA)?;
    out.push(DType::FixedText as u8);
    out.push(1);
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&(RECORD_FIELDS.len() as u16).to_le_bytes());
    for (name, width) in RECORD_FIELDS.iter().zip(widths) {
        put_str(&mut out, name)?;
        let width = u32::try_from(width)
            .map_err(|_| MnemosError::Serialization(format!("field {} too wide", name)))?;
        out.extend_from_slice(&width.to_le_bytes());
    }
    let row_width: usize = widths.iter().sum();
    out.extend_from_slice(&((row_width * store.len()) as u64).to_le_bytes());
    for record in store.records() {
        for (value, width) in record_values(record).iter().zip(widths) {
            out.extend_from_slice(value.as_bytes());
            out.resize(out.len() + (width - value.len()), 0);
        }
    }

    Ok(out)
}

fn decode(bytes: &[u8]) -> Result<MemoryStore> {
    let mut reader = Reader::new(bytes);

    if reader.take(MAGIC.len())? != MAGIC {
        return Err(MnemosError::corrupt("not a columnar memory container"));
    }
    let version = reader.u8()?;
    if version != VERSION {
        return Err(MnemosError::corrupt(format!(
            "unsupported columnar version {}",
            version
        )));
    }

    let dataset_count = reader.u32()?;
    let mut datasets: HashMap<String, Dataset<'_>> = HashMap::new();
    for _ in 0..dataset_count {
        let (name, dataset) = read_dataset(&mut reader)?;
        datasets.insert(name, dataset);
    }
    if !reader.is_exhausted() {
        return Err(MnemosError::corrupt("trailing bytes after last dataset"));
    }

    let embeddings = datasets
        .remove(EMBEDDINGS)
        .ok_or_else(|| MnemosError::corrupt("missing embeddings dataset"))?;
    let metadata = datasets
        .remove(METADATA)
        .ok_or_else(|| MnemosError::corrupt("missing metadata dataset"))?;

    let (count, dimension, vectors) = decode_embeddings(&embeddings)?;
    let records = decode_metadata(&metadata)?;
    if records.len() != count {
        return Err(MnemosError::corrupt(format!(
            "{} embedding rows but {} metadata rows",
            count,
            records.len()
        )));
    }

    if count == 0 {
        return Ok(if dimension > 0 {
            MemoryStore::with_dimension(dimension)
        } else {
            MemoryStore::new()
        });
    }
    crate::backend::assemble(records, vectors)
}

fn read_dataset<'a>(reader: &mut Reader<'a>) -> Result<(String, Dataset<'a>)> {
    let name = reader.string()?;
    let dtype_byte = reader.u8()?;
    let dtype = DType::from_byte(dtype_byte)
        .ok_or_else(|| MnemosError::corrupt(format!("unknown dtype 0x{:02x}", dtype_byte)))?;

    let rank = reader.u8()?;
    let shape = (0..rank)
        .map(|_| reader.u64())
        .collect::<Result<Vec<u64>>>()?;

    let mut fields = Vec::new();
    if dtype == DType::FixedText {
        let field_count = reader.u16()?;
        for _ in 0..field_count {
            let field = reader.string()?;
            let width = reader.u32()? as usize;
            fields.push((field, width));
        }
    }

    let payload_len = to_usize(reader.u64()?)?;
    let payload = reader.take(payload_len)?;

    Ok((
        name,
        Dataset {
            dtype,
            shape,
            fields,
            payload,
        },
    ))
}

fn decode_embeddings(dataset: &Dataset<'_>) -> Result<(usize, usize, Vec<Vec<f32>>)> {
    if dataset.dtype != DType::F32 || dataset.shape.len() != 2 {
        return Err(MnemosError::corrupt(
            "embeddings must be a 2-D f32 dataset",
        ));
    }
    let count = to_usize(dataset.shape[0])?;
    let dimension = to_usize(dataset.shape[1])?;

    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| MnemosError::corrupt("embeddings shape overflows"))?;
    if dataset.payload.len() != expected {
        return Err(MnemosError::corrupt(format!(
            "embeddings payload is {} bytes, shape requires {}",
            dataset.payload.len(),
            expected
        )));
    }
    if count > 0 && dimension == 0 {
        return Err(MnemosError::corrupt("embeddings have zero dimension"));
    }

    let vectors = dataset
        .payload
        .chunks_exact(dimension.max(1) * 4)
        .map(|row| {
            row.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        })
        .collect();
    Ok((count, dimension, vectors))
}

fn decode_metadata(dataset: &Dataset<'_>) -> Result<Vec<Record>> {
    if dataset.dtype != DType::FixedText || dataset.shape.len() != 1 {
        return Err(MnemosError::corrupt(
            "metadata must be a 1-D fixed-width text dataset",
        ));
    }
    let count = to_usize(dataset.shape[0])?;

    // Locate each required field by name; extra fields are ignored.
    let mut offsets = [(0usize, 0usize); 3];
    for (slot, wanted) in offsets.iter_mut().zip(RECORD_FIELDS) {
        let mut offset = 0;
        let mut found = false;
        for (name, width) in &dataset.fields {
            if name == wanted {
                *slot = (offset, *width);
                found = true;
                break;
            }
            offset += width;
        }
        if !found {
            return Err(MnemosError::corrupt(format!(
                "metadata is missing field {}",
                wanted
            )));
        }
    }

    let row_width: usize = dataset.fields.iter().map(|(_, w)| w).sum();
    if dataset.payload.len() != row_width.saturating_mul(count) {
        return Err(MnemosError::corrupt(format!(
            "metadata payload is {} bytes, shape requires {}",
            dataset.payload.len(),
            row_width.saturating_mul(count)
        )));
    }
    if count == 0 {
        return Ok(Vec::new());
    }
    if row_width == 0 {
        return Err(MnemosError::corrupt("metadata rows have zero width"));
    }

    dataset
        .payload
        .chunks_exact(row_width)
        .map(|row| {
            let [id, summary, timestamp] =
                offsets.map(|(offset, width)| fixed_text(&row[offset..offset + width]));
            Ok(Record::new(id?, summary?, timestamp?))
        })
        .collect()
}

fn record_values(record: &Record) -> [&str; 3] {
    [record.id(), record.summary(), record.timestamp()]
}

/// Byte width of each metadata field: the longest value, at least one byte.
fn field_widths(records: &[Record]) -> [usize; 3] {
    let mut widths = [1usize; 3];
    for record in records {
        for (width, value) in widths.iter_mut().zip(record_values(record)) {
            *width = (*width).max(value.len());
        }
    }
    widths
}

/// Decode a NUL-padded fixed-width UTF-8 field.
fn fixed_text(bytes: &[u8]) -> Result<String> {
    let end = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8(bytes[..end].to_vec())
        .map_err(|e| MnemosError::corrupt(format!("metadata field is not UTF-8: {}", e)))
}

fn put_str(out: &mut Vec<u8>, value: &str) -> Result<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| MnemosError::Serialization(format!("name too long: {}", value)))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| MnemosError::corrupt(format!("size {} too large", value)))
}

/// Bounds-checked little-endian cursor over the container bytes.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| MnemosError::corrupt("unexpected end of columnar container"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| MnemosError::corrupt("dataset name is not UTF-8"))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> MemoryStore {
        MemoryStore::from_parts(
            vec![
                Record::new("conv_0", "Feedback loops in LLMs and RL", "2025-04-1 10:00:00"),
                Record::new("c1", "Weather ☀ trip", "2025-04-2 10:00:00"),
            ],
            vec![vec![0.1, f32::MIN_POSITIVE, -0.0], vec![f32::MAX, 1e-30, 42.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let store = sample_store();
        let decoded = decode(&encode(&store).unwrap()).unwrap();
        assert_eq!(decoded.records(), store.records());
        let original: Vec<u32> = store.raw_vectors().iter().map(|v| v.to_bits()).collect();
        let restored: Vec<u32> = decoded.raw_vectors().iter().map(|v| v.to_bits()).collect();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_field_widths_fit_longest_value() {
        let widths = field_widths(sample_store().records());
        assert_eq!(widths[0], "conv_0".len());
        assert_eq!(widths[1], "Feedback loops in LLMs and RL".len());
        assert_eq!(widths[2], "2025-04-1 10:00:00".len());
        assert_eq!(field_widths(&[]), [1, 1, 1]);
    }

    #[test]
    fn test_long_summary_not_truncated() {
        let summary = "x".repeat(1_000);
        let store =
            MemoryStore::from_parts(vec![Record::new("a", summary.clone(), "t")], vec![vec![1.0]])
                .unwrap();
        let decoded = decode(&encode(&store).unwrap()).unwrap();
        assert_eq!(decoded.get(0).unwrap().0.summary(), summary);
    }

    #[test]
    fn test_empty_store_keeps_dimension() {
        let store = MemoryStore::with_dimension(16);
        let decoded = decode(&encode(&store).unwrap()).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.dimension(), Some(16));
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let mut bytes = encode(&sample_store()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(MnemosError::CorruptData(_))));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let bytes = encode(&sample_store()).unwrap();
        for cut in [3, 7, 20, bytes.len() - 1] {
            assert!(
                matches!(decode(&bytes[..cut]), Err(MnemosError::CorruptData(_))),
                "cut at {} should be corrupt",
                cut
            );
        }
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let mut bytes = encode(&sample_store()).unwrap();
        bytes[MAGIC.len()] = 99;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, MnemosError::CorruptData(ref m) if m.contains("version")));
    }

    #[test]
    fn test_file_round_trip_and_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.mcol");

        assert!(matches!(load(&path), Err(MnemosError::NotFound(_))));

        let store = sample_store();
        save(&store, &path).unwrap();
        assert_eq!(load(&path).unwrap(), store);
    }
}

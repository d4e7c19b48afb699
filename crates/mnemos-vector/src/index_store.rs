//! Binary artifact for a [`SimilarityIndex`].
//!
//! Layout (little-endian):
//!
//! ```text
//! "MNIDX\0" | version: u8 | dimension: u32 | count: u64 | count * dimension f32
//! ```
//!
//! The artifact only holds vectors, so it can be loaded regardless of which
//! persistence backend wrote the originating store.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::info;

use mnemos_core::error::{MnemosError, Result};
use mnemos_storage::atomic::{require_file, write_atomic};

use crate::index::SimilarityIndex;

const MAGIC: &[u8; 6] = b"MNIDX\0";
const VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1 + 4 + 8;

impl SimilarityIndex {
    /// Write this index to `path`, atomically replacing any previous file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dimension = u32::try_from(self.dimension()).map_err(|_| {
            MnemosError::Serialization(format!(
                "index dimension {} does not fit the artifact header",
                self.dimension()
            ))
        })?;
        let count = self.len() as u64;

        write_atomic(path, |w| {
            w.write_all(MAGIC)?;
            w.write_all(&[VERSION])?;
            w.write_all(&dimension.to_le_bytes())?;
            w.write_all(&count.to_le_bytes())?;
            for value in self.raw_vectors() {
                w.write_all(&value.to_le_bytes())?;
            }
            Ok(())
        })?;

        info!(
            path = %path.display(),
            count,
            dimension,
            "Saved similarity index"
        );
        Ok(())
    }

    /// Read an index previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self> {
        require_file(path)?;
        let bytes = fs::read(path)?;
        let index = decode(&bytes)?;
        info!(
            path = %path.display(),
            count = index.len(),
            dimension = index.dimension(),
            "Loaded similarity index"
        );
        Ok(index)
    }
}

fn decode(bytes: &[u8]) -> Result<SimilarityIndex> {
    if bytes.len() < HEADER_LEN {
        return Err(MnemosError::corrupt(format!(
            "index artifact is {} bytes, shorter than its header",
            bytes.len()
        )));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if &header[..MAGIC.len()] != MAGIC {
        return Err(MnemosError::corrupt("not an index artifact"));
    }
    let version = header[MAGIC.len()];
    if version != VERSION {
        return Err(MnemosError::corrupt(format!(
            "index version mismatch: expected {}, found {}",
            VERSION, version
        )));
    }

    let mut dim_bytes = [0u8; 4];
    dim_bytes.copy_from_slice(&header[7..11]);
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[11..19]);
    let dimension = u32::from_le_bytes(dim_bytes) as usize;
    let count = u64::from_le_bytes(count_bytes);

    if dimension == 0 {
        return Err(MnemosError::corrupt("index artifact has zero dimension"));
    }
    let expected = usize::try_from(count)
        .ok()
        .and_then(|c| c.checked_mul(dimension))
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| MnemosError::corrupt("index artifact size overflows"))?;
    if body.len() != expected {
        return Err(MnemosError::corrupt(format!(
            "index body is {} bytes, expected {} for {} x {}",
            body.len(),
            expected,
            count,
            dimension
        )));
    }

    let data = body
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    SimilarityIndex::from_raw(dimension, data)
}

/// Write `index` to `path`.
pub fn persist_index(index: &SimilarityIndex, path: &Path) -> Result<()> {
    index.save(path)
}

/// Read the index stored at `path`.
pub fn load_index(path: &Path) -> Result<SimilarityIndex> {
    SimilarityIndex::load(path)
}

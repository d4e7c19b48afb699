//! Blob encoding: a single bincode-serialized composite object.
//!
//! The file is one version byte followed by a bincode-encoded
//! [`BlobImage`]. Version mismatches are rejected as corrupt data; there is
//! no migration.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use mnemos_core::error::{MnemosError, Result};
use mnemos_core::types::{Record, RECORD_FIELDS};

use crate::atomic::{require_file, write_atomic};
use crate::store::MemoryStore;

/// Serialization version for [`BlobImage`]. Bump when the layout changes.
pub const BLOB_VERSION: u8 = 2;

/// The composite object stored in a blob file.
///
/// `metadata` is a list of field maps rather than a typed struct so the file
/// stays self-describing: each entry names its own fields. `dimension` is
/// carried separately so an empty store keeps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobImage {
    pub dimension: Option<usize>,
    pub embeddings: Vec<Vec<f32>>,
    pub metadata: Vec<BTreeMap<String, String>>,
}

impl BlobImage {
    pub fn from_store(store: &MemoryStore) -> Self {
        Self {
            dimension: store.dimension(),
            embeddings: store.vectors().map(<[f32]>::to_vec).collect(),
            metadata: store.records().iter().map(record_to_fields).collect(),
        }
    }

    pub fn into_store(self) -> Result<MemoryStore> {
        if self.embeddings.len() != self.metadata.len() {
            return Err(MnemosError::corrupt(format!(
                "{} embeddings but {} metadata entries",
                self.embeddings.len(),
                self.metadata.len()
            )));
        }
        let records = self
            .metadata
            .iter()
            .enumerate()
            .map(|(i, fields)| record_from_fields(i, fields))
            .collect::<Result<Vec<Record>>>()?;

        if self.embeddings.is_empty() {
            return Ok(match self.dimension {
                Some(dimension) if dimension > 0 => MemoryStore::with_dimension(dimension),
                _ => MemoryStore::new(),
            });
        }

        let store = crate::backend::assemble(records, self.embeddings)?;
        match (self.dimension, store.dimension()) {
            (Some(expected), Some(actual)) if expected != actual => {
                Err(MnemosError::DimensionMismatch { expected, actual })
            }
            _ => Ok(store),
        }
    }
}

pub(crate) fn save(store: &MemoryStore, path: &Path) -> Result<()> {
    let encoded = bincode::serialize(&BlobImage::from_store(store))
        .map_err(|e| MnemosError::Serialization(format!("blob encode: {}", e)))?;

    write_atomic(path, |w| {
        w.write_all(&[BLOB_VERSION])?;
        w.write_all(&encoded)?;
        Ok(())
    })?;

    info!(
        path = %path.display(),
        count = store.len(),
        bytes = encoded.len() + 1,
        "Saved memory store as blob"
    );
    Ok(())
}

pub(crate) fn load(path: &Path) -> Result<MemoryStore> {
    require_file(path)?;
    let bytes = fs::read(path)?;

    let (version, body) = bytes
        .split_first()
        .ok_or_else(|| MnemosError::corrupt("blob file is empty"))?;
    if *version != BLOB_VERSION {
        return Err(MnemosError::corrupt(format!(
            "blob version mismatch: expected {}, found {}",
            BLOB_VERSION, version
        )));
    }

    let image: BlobImage = bincode::deserialize(body)
        .map_err(|e| MnemosError::corrupt(format!("blob decode: {}", e)))?;
    let store = image.into_store()?;

    info!(path = %path.display(), count = store.len(), "Loaded memory store from blob");
    Ok(store)
}

fn record_to_fields(record: &Record) -> BTreeMap<String, String> {
    let [id_key, summary_key, timestamp_key] = RECORD_FIELDS;
    BTreeMap::from([
        (id_key.to_string(), record.id().to_string()),
        (summary_key.to_string(), record.summary().to_string()),
        (timestamp_key.to_string(), record.timestamp().to_string()),
    ])
}

fn record_from_fields(index: usize, fields: &BTreeMap<String, String>) -> Result<Record> {
    let field = |name: &str| {
        fields.get(name).cloned().ok_or_else(|| {
            MnemosError::corrupt(format!("metadata entry {} has no {} field", index, name))
        })
    };
    let [id_key, summary_key, timestamp_key] = RECORD_FIELDS;
    Ok(Record::new(
        field(id_key)?,
        field(summary_key)?,
        field(timestamp_key)?,
    ))
}

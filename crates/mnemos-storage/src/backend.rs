//! Persistence backends for [`MemoryStore`].
//!
//! A backend is a pure persistence decision: callers pick a variant (usually
//! from configuration) and the store, index and retrieval code are unchanged.
//! Every variant writes through [`crate::atomic::write_atomic`], so a failed
//! save never clobbers a previously valid store.

use std::path::{Path, PathBuf};

use tracing::debug;

use mnemos_core::config::{BackendConfig, MnemosConfig};
use mnemos_core::error::{MnemosError, Result};
use mnemos_core::types::Record;

use crate::store::MemoryStore;
use crate::tabular::TabularOptions;
use crate::{blob, columnar, tabular};

/// Where and how a [`MemoryStore`] is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceBackend {
    /// Delimited vector table plus a JSON metadata document.
    Tabular {
        vectors_path: PathBuf,
        metadata_path: PathBuf,
        options: TabularOptions,
    },
    /// Single binary container with `embeddings` and `metadata` datasets.
    Columnar { path: PathBuf },
    /// Single serialized composite object.
    Blob { path: PathBuf },
}

impl PersistenceBackend {
    pub fn tabular(vectors_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        PersistenceBackend::Tabular {
            vectors_path: vectors_path.into(),
            metadata_path: metadata_path.into(),
            options: TabularOptions::default(),
        }
    }

    pub fn columnar(path: impl Into<PathBuf>) -> Self {
        PersistenceBackend::Columnar { path: path.into() }
    }

    pub fn blob(path: impl Into<PathBuf>) -> Self {
        PersistenceBackend::Blob { path: path.into() }
    }

    /// Replace the tabular formatting options. Other variants are unchanged.
    pub fn with_tabular_options(mut self, new_options: TabularOptions) -> Self {
        if let PersistenceBackend::Tabular { options, .. } = &mut self {
            *options = new_options;
        }
        self
    }

    /// Build the configured backend, resolving file names against the data
    /// directory.
    pub fn from_config(config: &MnemosConfig) -> Self {
        let storage = &config.storage;
        match &storage.backend {
            BackendConfig::Tabular {
                vectors_file,
                metadata_file,
            } => PersistenceBackend::Tabular {
                vectors_path: config.resolve(vectors_file),
                metadata_path: config.resolve(metadata_file),
                options: TabularOptions {
                    precision: storage.tabular_precision,
                    header: storage.tabular_header,
                },
            },
            BackendConfig::Columnar { file } => Self::columnar(config.resolve(file)),
            BackendConfig::Blob { file } => Self::blob(config.resolve(file)),
        }
    }

    /// Short variant name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PersistenceBackend::Tabular { .. } => "tabular",
            PersistenceBackend::Columnar { .. } => "columnar",
            PersistenceBackend::Blob { .. } => "blob",
        }
    }

    /// Files this backend reads and writes.
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            PersistenceBackend::Tabular {
                vectors_path,
                metadata_path,
                ..
            } => vec![vectors_path.as_path(), metadata_path.as_path()],
            PersistenceBackend::Columnar { path } | PersistenceBackend::Blob { path } => {
                vec![path.as_path()]
            }
        }
    }

    /// Largest per-component difference a save/load round trip may introduce.
    ///
    /// Zero for the binary variants, which store raw `f32` bits.
    pub fn tolerance(&self) -> f32 {
        match self {
            PersistenceBackend::Tabular { options, .. } => options.tolerance(),
            PersistenceBackend::Columnar { .. } | PersistenceBackend::Blob { .. } => 0.0,
        }
    }

    /// Write every record and vector of `store`.
    pub fn save(&self, store: &MemoryStore) -> Result<()> {
        debug!(backend = self.name(), count = store.len(), "Saving memory store");
        match self {
            PersistenceBackend::Tabular {
                vectors_path,
                metadata_path,
                options,
            } => tabular::save(store, vectors_path, metadata_path, *options),
            PersistenceBackend::Columnar { path } => columnar::save(store, path),
            PersistenceBackend::Blob { path } => blob::save(store, path),
        }
    }

    /// Reconstruct the store previously written by [`save`](Self::save).
    pub fn load(&self) -> Result<MemoryStore> {
        debug!(backend = self.name(), "Loading memory store");
        match self {
            PersistenceBackend::Tabular {
                vectors_path,
                metadata_path,
                options,
            } => tabular::load(vectors_path, metadata_path, *options),
            PersistenceBackend::Columnar { path } => columnar::load(path),
            PersistenceBackend::Blob { path } => blob::load(path),
        }
    }
}

/// Rebuild a store from decoded parts.
///
/// Inconsistent vector lengths keep their `DimensionMismatch`; integrity
/// failures that can only come from a damaged file become `CorruptData`.
pub(crate) fn assemble(records: Vec<Record>, vectors: Vec<Vec<f32>>) -> Result<MemoryStore> {
    MemoryStore::from_parts(records, vectors).map_err(|e| match e {
        MnemosError::DuplicateId(id) => {
            MnemosError::corrupt(format!("duplicate record id {} in stored data", id))
        }
        MnemosError::AlignmentMismatch { records, vectors } => MnemosError::corrupt(format!(
            "{} records but {} vectors in stored data",
            records, vectors
        )),
        MnemosError::EmptyInput => MnemosError::corrupt("stored vector has no components"),
        other => other,
    })
}

//! Mnemos ingestion and persistence pipeline.
//!
//! Free functions cover the programmatic surface (ingest, persist, load,
//! build and persist the index). [`MemoryLayout`] ties them to a
//! [`MnemosConfig`] so a caller can write or reopen a whole memory (store,
//! index and retrieval engine) from one configuration value.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Days, NaiveDateTime};
use tracing::{debug, info};

use mnemos_core::config::MnemosConfig;
use mnemos_core::error::{MnemosError, Result};
use mnemos_core::types::Record;
use mnemos_storage::{MemoryStore, PersistenceBackend};

use crate::embedding::Embedder;
use crate::index::SimilarityIndex;
use crate::retrieval::RetrievalEngine;

pub use crate::index_store::{load_index, persist_index};

/// Rendering used for generated conversation timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Build a store from parallel record and vector lists.
pub fn ingest(records: Vec<Record>, vectors: Vec<Vec<f32>>) -> Result<MemoryStore> {
    let store = MemoryStore::from_parts(records, vectors)?;
    info!(
        count = store.len(),
        dimension = store.dimension().unwrap_or(0),
        "Ingested records"
    );
    Ok(store)
}

pub fn persist(store: &MemoryStore, backend: &PersistenceBackend) -> Result<()> {
    backend.save(store)
}

pub fn load(backend: &PersistenceBackend) -> Result<MemoryStore> {
    backend.load()
}

pub fn build_index(store: &MemoryStore) -> Result<SimilarityIndex> {
    SimilarityIndex::from_store(store)
}

/// Embed each `(summary, timestamp)` pair and collect them into a store.
///
/// Records are numbered `conv_0`, `conv_1`, ... in input order. The store's
/// dimension is fixed to the embedder's, so an embedder that returns the
/// wrong length fails with `DimensionMismatch`.
pub async fn ingest_timestamped<E, I, S, T>(embedder: &E, entries: I) -> Result<MemoryStore>
where
    E: Embedder,
    I: IntoIterator<Item = (S, T)>,
    S: Into<String>,
    T: Into<String>,
{
    let mut store = MemoryStore::with_dimension(embedder.dimension());
    for (i, (summary, timestamp)) in entries.into_iter().enumerate() {
        let summary = summary.into();
        let vector = embedder.encode(&summary).await?;
        let record = Record::new(format!("conv_{}", i), summary, timestamp);
        debug!(id = record.id(), "Embedded conversation");
        store.append(record, vector)?;
    }
    info!(count = store.len(), "Ingested conversations");
    Ok(store)
}

/// Embed `conversations` in order, stamping conversation `i` with `start`
/// plus `i` days.
pub async fn ingest_conversations<E, S>(
    embedder: &E,
    conversations: &[S],
    start: NaiveDateTime,
) -> Result<MemoryStore>
where
    E: Embedder,
    S: AsRef<str>,
{
    let entries = conversations
        .iter()
        .enumerate()
        .map(|(i, text)| -> Result<(String, String)> {
            let at = start.checked_add_days(Days::new(i as u64)).ok_or_else(|| {
                MnemosError::Config(format!("timestamp for conversation {} is out of range", i))
            })?;
            Ok((text.as_ref().to_string(), at.format(TIMESTAMP_FORMAT).to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    ingest_timestamped(embedder, entries).await
}

/// Configured locations and defaults for one memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryLayout {
    pub backend: PersistenceBackend,
    pub index_path: PathBuf,
    pub default_k: usize,
    pub header: String,
    /// Embedding width every saved store, index and embedder must have.
    pub dimension: usize,
}

impl MemoryLayout {
    pub fn from_config(config: &MnemosConfig) -> Self {
        Self {
            backend: PersistenceBackend::from_config(config),
            index_path: config.index_path(),
            default_k: config.retrieval.default_k,
            header: config.retrieval.header.clone(),
            dimension: config.embedding.dimension,
        }
    }

    fn expect_dimension(&self, actual: usize) -> Result<()> {
        if actual == self.dimension {
            Ok(())
        } else {
            Err(MnemosError::DimensionMismatch {
                expected: self.dimension,
                actual,
            })
        }
    }

    /// Build the index for `store`, then persist both.
    ///
    /// Nothing is written unless the store has the configured dimension and
    /// its index builds.
    pub fn save_all(&self, store: &MemoryStore) -> Result<SimilarityIndex> {
        if let Some(dimension) = store.dimension() {
            self.expect_dimension(dimension)?;
        }
        let index = build_index(store)?;
        persist(store, &self.backend)?;
        persist_index(&index, &self.index_path)?;
        info!(
            backend = self.backend.name(),
            index = %self.index_path.display(),
            count = store.len(),
            "Saved memory"
        );
        Ok(index)
    }

    /// Load the store and its index, checking that they describe the same
    /// vectors at the configured dimension.
    pub fn load_all(&self) -> Result<(MemoryStore, SimilarityIndex)> {
        let store = load(&self.backend)?;
        let index = load_index(&self.index_path)?;
        self.expect_dimension(index.dimension())?;
        if index.len() != store.len() {
            return Err(MnemosError::AlignmentMismatch {
                records: store.len(),
                vectors: index.len(),
            });
        }
        if let Some(dimension) = store.dimension() {
            if dimension != index.dimension() {
                return Err(MnemosError::DimensionMismatch {
                    expected: index.dimension(),
                    actual: dimension,
                });
            }
        }
        Ok((store, index))
    }

    /// Load everything and wrap it in a [`RetrievalEngine`] using the
    /// configured header.
    pub fn open_engine(&self, embedder: impl Embedder + 'static) -> Result<RetrievalEngine> {
        self.expect_dimension(embedder.dimension())?;
        let (store, index) = self.load_all()?;
        Ok(RetrievalEngine::new(embedder, Arc::new(index), Arc::new(store))
            .with_header(self.header.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use mnemos_core::config::BackendConfig;

    use crate::embedding::HashEmbedder;

    fn april_first() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 4, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_conversations_ids_and_timestamps() {
        let embedder = HashEmbedder::new(32);
        let store = ingest_conversations(&embedder, &["first", "second", "third"], april_first())
            .await
            .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.dimension(), Some(32));
        let (record, vector) = store.get(2).unwrap();
        assert_eq!(record.id(), "conv_2");
        assert_eq!(record.summary(), "third");
        assert_eq!(record.timestamp(), "2025-04-03 10:00:00");
        assert_eq!(vector, embedder.vector_for("third").as_slice());
    }

    #[tokio::test]
    async fn test_ingest_rejects_wrong_embedder_output() {
        struct Liar;
        impl Embedder for Liar {
            async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![1.0; 3])
            }
            fn dimension(&self) -> usize {
                4
            }
        }

        let err = ingest_timestamped(&Liar, [("a", "t")]).await.unwrap_err();
        assert!(matches!(
            err,
            MnemosError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_ingest_and_build_index() {
        let store = ingest(
            vec![Record::new("c0", "A", "t"), Record::new("c1", "B", "t")],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        let index = build_index(&store).unwrap();
        assert_eq!(index.len(), 2);

        assert!(matches!(
            ingest(vec![Record::new("c0", "A", "t")], vec![]),
            Err(MnemosError::AlignmentMismatch {
                records: 1,
                vectors: 0
            })
        ));
    }

    #[tokio::test]
    async fn test_layout_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MnemosConfig::default();
        config.general.data_dir = dir.path().to_path_buf();
        config.storage.backend = BackendConfig::columnar_default();
        config.retrieval.header = "Earlier:".to_string();
        config.embedding.dimension = 16;

        let embedder = HashEmbedder::new(16);
        let store = ingest_conversations(&embedder, &["alpha", "beta"], april_first())
            .await
            .unwrap();

        let layout = MemoryLayout::from_config(&config);
        assert_eq!(layout.default_k, 2);
        layout.save_all(&store).unwrap();
        assert!(dir.path().join("latent_memory.mcol").is_file());
        assert!(dir.path().join("memory_index.bin").is_file());

        let engine = layout.open_engine(embedder).unwrap();
        let context = engine.build_context("beta", 1).await.unwrap();
        assert_eq!(context, "Earlier:\n- beta (Timestamp: 2025-04-02 10:00:00)\n");
    }

    #[tokio::test]
    async fn test_layout_detects_stale_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MnemosConfig::default();
        config.general.data_dir = dir.path().to_path_buf();
        config.embedding.dimension = 8;
        let layout = MemoryLayout::from_config(&config);

        let embedder = HashEmbedder::new(8);
        let two = ingest_conversations(&embedder, &["a", "b"], april_first())
            .await
            .unwrap();
        let three = ingest_conversations(&embedder, &["a", "b", "c"], april_first())
            .await
            .unwrap();

        layout.save_all(&two).unwrap();
        persist(&three, &layout.backend).unwrap();

        assert!(matches!(
            layout.load_all(),
            Err(MnemosError::AlignmentMismatch {
                records: 3,
                vectors: 2
            })
        ));
        assert!(matches!(
            layout.open_engine(HashEmbedder::new(8)),
            Err(MnemosError::AlignmentMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_engine_checks_embedder_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MnemosConfig::default();
        config.general.data_dir = dir.path().to_path_buf();
        config.embedding.dimension = 8;
        let layout = MemoryLayout::from_config(&config);

        let store = ingest_conversations(&HashEmbedder::new(8), &["a"], april_first())
            .await
            .unwrap();
        layout.save_all(&store).unwrap();

        assert!(matches!(
            layout.open_engine(HashEmbedder::new(9)),
            Err(MnemosError::DimensionMismatch {
                expected: 8,
                actual: 9
            })
        ));
    }

    #[tokio::test]
    async fn test_layout_enforces_configured_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MnemosConfig::default();
        config.general.data_dir = dir.path().to_path_buf();
        config.embedding.dimension = 8;
        let layout = MemoryLayout::from_config(&config);
        assert_eq!(layout.dimension, 8);

        let wide = ingest_conversations(&HashEmbedder::new(12), &["a"], april_first())
            .await
            .unwrap();
        assert!(matches!(
            layout.save_all(&wide),
            Err(MnemosError::DimensionMismatch {
                expected: 8,
                actual: 12
            })
        ));
        assert!(!layout.index_path.exists());
        assert!(layout.backend.paths().iter().all(|p| !p.exists()));

        let store = ingest_conversations(&HashEmbedder::new(8), &["a"], april_first())
            .await
            .unwrap();
        layout.save_all(&store).unwrap();

        // The same files read under a different configured width.
        config.embedding.dimension = 16;
        let resized = MemoryLayout::from_config(&config);
        assert!(matches!(
            resized.load_all(),
            Err(MnemosError::DimensionMismatch {
                expected: 16,
                actual: 8
            })
        ));
        assert!(matches!(
            resized.open_engine(HashEmbedder::new(16)),
            Err(MnemosError::DimensionMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }

    #[tokio::test]
    async fn test_failed_index_build_leaves_saved_memory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MnemosConfig::default();
        config.general.data_dir = dir.path().to_path_buf();
        config.embedding.dimension = 8;
        let layout = MemoryLayout::from_config(&config);

        let store = ingest_conversations(&HashEmbedder::new(8), &["a", "b"], april_first())
            .await
            .unwrap();
        layout.save_all(&store).unwrap();

        // A store without any dimension cannot be indexed.
        assert!(matches!(
            layout.save_all(&MemoryStore::new()),
            Err(MnemosError::EmptyInput)
        ));

        let (loaded, index) = layout.load_all().unwrap();
        assert_eq!(loaded, store);
        assert_eq!(index.len(), 2);
    }
}

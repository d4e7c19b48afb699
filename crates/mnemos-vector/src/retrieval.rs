//! Query path: text to ranked records to a formatted context block.
//!
//! [`RetrievalEngine`] holds an embedder, a store and the index built from
//! it. Store and index are shared behind `Arc` so one loaded pair can serve
//! many concurrent readers.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use mnemos_core::error::{MnemosError, Result};
use mnemos_core::types::Record;
use mnemos_storage::MemoryStore;

use crate::embedding::{DynEmbedder, Embedder};
use crate::index::{SearchHit, SimilarityIndex};

/// Header line used when no other header is configured.
pub const DEFAULT_HEADER: &str = "Relevant past conversations:";

/// One ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedRecord {
    pub position: usize,
    pub score: f32,
    pub record: Record,
}

/// Answers text queries against a store and its index.
///
/// Uses dynamic dispatch (`Box<dyn DynEmbedder>`) so the real model and
/// `HashEmbedder` are interchangeable without generics.
pub struct RetrievalEngine {
    embedder: Box<dyn DynEmbedder>,
    index: Arc<SimilarityIndex>,
    store: Arc<MemoryStore>,
    header: String,
}

impl RetrievalEngine {
    pub fn new(
        embedder: impl Embedder + 'static,
        index: Arc<SimilarityIndex>,
        store: Arc<MemoryStore>,
    ) -> Self {
        Self::new_dyn(Box::new(embedder), index, store)
    }

    /// Create an engine from a pre-boxed embedder.
    pub fn new_dyn(
        embedder: Box<dyn DynEmbedder>,
        index: Arc<SimilarityIndex>,
        store: Arc<MemoryStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            header: DEFAULT_HEADER.to_string(),
        }
    }

    /// Replace the header line used by [`build_context`](Self::build_context).
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Embed `query` and return the `k` best records with their scores.
    pub async fn retrieve_scored(&self, query: &str, k: usize) -> Result<Vec<RetrievedRecord>> {
        let query_vec = self.embedder.encode_boxed(query).await?;
        let hits = ranked(&self.index, &query_vec, k)?;

        let results = hits
            .into_iter()
            .map(|hit| {
                let record = record_at(&self.store, hit.position)?;
                Ok(RetrievedRecord {
                    position: hit.position,
                    score: hit.score,
                    record: record.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(k, returned = results.len(), "Retrieved records");
        Ok(results)
    }

    /// Embed `query` and return the `k` best records in ranked order.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Record>> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|r| r.record)
            .collect())
    }

    /// Retrieve and render the context block for `query`.
    pub async fn build_context(&self, query: &str, k: usize) -> Result<String> {
        let records = self.retrieve(query, k).await?;
        Ok(format_context_with_header(&self.header, &records))
    }
}

/// One-shot retrieval without constructing an engine.
pub async fn retrieve<E>(
    query: &str,
    embedder: &E,
    index: &SimilarityIndex,
    store: &MemoryStore,
    k: usize,
) -> Result<Vec<Record>>
where
    E: DynEmbedder + ?Sized,
{
    let query_vec = embedder.encode_boxed(query).await?;
    ranked(index, &query_vec, k)?
        .into_iter()
        .map(|hit| record_at(store, hit.position).cloned())
        .collect()
}

/// Search `index`, treating an empty index as having no matches.
///
/// `k` and the query dimension are still validated first.
fn ranked(index: &SimilarityIndex, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
    if index.is_empty() && k > 0 && query.len() == index.dimension() {
        return Ok(Vec::new());
    }
    index.search(query, k)
}

/// A position the index returned must exist in the store; anything else
/// means the pair was built from different data.
fn record_at(store: &MemoryStore, position: usize) -> Result<&Record> {
    store
        .get(position)
        .map(|(record, _)| record)
        .map_err(|_| MnemosError::PositionOutOfRange {
            position,
            len: store.len(),
        })
}

/// Render `records` under the default header.
pub fn format_context(records: &[Record]) -> String {
    format_context_with_header(DEFAULT_HEADER, records)
}

/// Render a header line followed by one bullet per record, in the given
/// order. Every line ends with a newline.
pub fn format_context_with_header(header: &str, records: &[Record]) -> String {
    let mut context = String::with_capacity(header.len() + 1 + records.len() * 64);
    context.push_str(header);
    context.push('\n');
    for record in records {
        // Writing to a String cannot fail.
        let _ = writeln!(
            context,
            "- {} (Timestamp: {})",
            record.summary(),
            record.timestamp()
        );
    }
    context
}

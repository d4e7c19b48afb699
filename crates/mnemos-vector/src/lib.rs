//! Mnemos Vector crate - similarity index, index artifact, embedder
//! capability, retrieval engine and ingestion pipeline.
//!
//! Provides exact brute-force inner-product search over the vectors of a
//! `MemoryStore`, a binary artifact for persisting the index, an embedder
//! trait with a deterministic hash-based implementation, and the query path
//! that turns text into a formatted block of past conversations.

pub mod embedding;
pub mod index;
pub mod index_store;
pub mod pipeline;
pub mod retrieval;

pub use embedding::{normalize, DynEmbedder, Embedder, HashEmbedder};
pub use index::{SearchHit, SimilarityIndex};
pub use index_store::{load_index, persist_index};
pub use pipeline::{
    build_index, ingest, ingest_conversations, ingest_timestamped, load, persist, MemoryLayout,
};
pub use retrieval::{format_context, format_context_with_header, retrieve, RetrievalEngine, RetrievedRecord};

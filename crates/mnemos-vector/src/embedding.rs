//! Embedder capability and a deterministic stand-in implementation.
//!
//! The real text-to-vector model lives outside this workspace; anything that
//! implements [`Embedder`] can be plugged into ingestion and retrieval.
//! `HashEmbedder` produces deterministic hash-based unit vectors for tests,
//! benchmarks and demos.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;

use mnemos_core::error::{MnemosError, Result};

/// Turns text into a fixed-dimension vector.
///
/// Implementations must be deterministic for the same input and always
/// return exactly [`dimension`](Embedder::dimension) components. Bounding
/// the latency of a slow model is the implementation's responsibility.
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    fn encode(&self, text: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Number of components in every vector this embedder produces.
    fn dimension(&self) -> usize;
}

/// Object-safe version of [`Embedder`] for dynamic dispatch.
///
/// `Embedder::encode` returns `impl Future`, which is not object-safe. This
/// trait boxes the future instead so `Box<dyn DynEmbedder>` can be stored in
/// structs without generics. Every `Embedder` gets it via a blanket impl.
pub trait DynEmbedder: Send + Sync {
    fn encode_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>>> + Send + 'a>>;

    fn dimension(&self) -> usize;
}

impl<T: Embedder> DynEmbedder for T {
    fn encode_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>>> + Send + 'a>> {
        Box::pin(self.encode(text))
    }

    fn dimension(&self) -> usize {
        Embedder::dimension(self)
    }
}

/// Deterministic embedder that hashes text into a unit vector.
///
/// Identical text always yields an identical vector; different text yields
/// (almost certainly) different vectors. Useful anywhere a real model is
/// unavailable. It carries no semantic meaning.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Synchronous form of [`Embedder::encode`].
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }
        normalize(&mut result);
        result
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(MnemosError::Embedding("Cannot embed empty text".to_string()));
        }
        Ok(self.vector_for(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Scale `vector` to unit length in place. Zero vectors are left unchanged.
///
/// The index scores by raw inner product; callers who want cosine
/// similarity normalize both stored and query vectors with this first.
pub fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
}

//! Mnemos Storage crate - the aligned record/vector store and its three
//! interchangeable on-disk encodings.
//!
//! - `tabular`: comma-separated vectors plus a JSON metadata list
//! - `columnar`: a single binary container with typed datasets
//! - `blob`: a single bincode-serialized composite object
//!
//! All writes go through an atomic temp-file-then-rename helper.

pub mod atomic;
pub mod backend;
pub mod blob;
pub mod columnar;
pub mod store;
pub mod tabular;

pub use backend::PersistenceBackend;
pub use blob::BlobImage;
pub use store::{Entries, MemoryStore};
pub use tabular::TabularOptions;

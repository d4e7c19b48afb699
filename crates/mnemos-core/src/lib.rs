//! Mnemos core - record model, error taxonomy, configuration and logging
//! setup shared by the storage and vector crates.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::{BackendConfig, MnemosConfig};
pub use error::{MnemosError, Result};
pub use telemetry::{init_tracing, init_tracing_from_config};
pub use types::{Record, RECORD_FIELDS};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MnemosError, Result};

/// Top-level configuration for a Mnemos memory workspace.
///
/// Every path the engine touches is derived from this value; nothing is read
/// from process-wide state. Missing sections fall back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MnemosConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl MnemosConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MnemosConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MnemosError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Resolve a configured file name against the data directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.general.data_dir.join(file)
        }
    }

    /// Location of the similarity index artifact.
    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.index.file)
    }
}

/// General settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory that relative storage and index paths are resolved against.
    pub data_dir: PathBuf,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
        }
    }
}

/// Which on-disk encoding holds the memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Delimited text table of vectors plus a JSON metadata document.
    Tabular {
        vectors_file: PathBuf,
        metadata_file: PathBuf,
    },
    /// Single binary container with typed `embeddings` and `metadata` datasets.
    Columnar { file: PathBuf },
    /// Single serialized composite object.
    Blob { file: PathBuf },
}

impl BackendConfig {
    pub fn tabular_default() -> Self {
        BackendConfig::Tabular {
            vectors_file: PathBuf::from("embeddings.csv"),
            metadata_file: PathBuf::from("metadata.json"),
        }
    }

    pub fn columnar_default() -> Self {
        BackendConfig::Columnar {
            file: PathBuf::from("latent_memory.mcol"),
        }
    }

    pub fn blob_default() -> Self {
        BackendConfig::Blob {
            file: PathBuf::from("latent_memory.blob"),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::blob_default()
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Decimal places written by the tabular backend. `None` writes the
    /// shortest text that parses back to the identical `f32`.
    pub tabular_precision: Option<usize>,
    /// Whether the tabular vector file carries a header row.
    pub tabular_header: bool,
    pub backend: BackendConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            tabular_precision: None,
            tabular_header: true,
            backend: BackendConfig::default(),
        }
    }
}

/// Similarity index settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index artifact file name.
    pub file: PathBuf,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::from("memory_index.bin"),
        }
    }
}

/// Query-time settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of records returned when the caller does not choose.
    pub default_k: usize,
    /// First line of the formatted context block.
    pub header: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 2,
            header: "Relevant past conversations:".to_string(),
        }
    }
}

/// Embedding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Vector dimension the store and index are expected to hold.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimension: 384 }
    }
}

use serde::{Deserialize, Serialize};

/// One stored interaction: an identifier, a text summary and a timestamp.
///
/// Records are immutable once built. The vector that represents a record is
/// held alongside it by the store, addressed by position rather than by id.
/// The id serializes as `conversation_id` so metadata files stay readable by
/// tools that expect that column name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "conversation_id")]
    id: String,
    summary: String,
    timestamp: String,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        summary: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

/// Names of the metadata fields, in on-disk column order.
pub const RECORD_FIELDS: [&str; 3] = ["conversation_id", "summary", "timestamp"];

use serde::{Deserialize, Serialize};

use crate::types::{ClaimId, LogLevel, StageTag, Timestamp};

/// An append-only audit log line (§3). Never mutated after insertion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: uuid::Uuid,
    pub claim_id: ClaimId,
    pub stage: StageTag,
    pub level: LogLevel,
    pub message: String,
    pub metadata: serde_json::Value,
    pub timestamp: Timestamp,
}

impl LogEntry {
    pub fn new(claim_id: ClaimId, stage: StageTag, level: LogLevel, message: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            claim_id,
            stage,
            level,
            message: message.into(),
            metadata: serde_json::Value::Null,
            timestamp,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

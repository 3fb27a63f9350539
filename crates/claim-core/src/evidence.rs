use serde::{Deserialize, Serialize};

use crate::types::{ClaimId, EvidenceId, EvidenceKind};

/// One claimant-submitted evidence artifact (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub claim_id: ClaimId,
    pub kind: EvidenceKind,
    /// Opaque to the core — resolved by whatever storage backend holds the bytes.
    pub storage_path: String,
    pub declared_mime: String,
    pub byte_size: u64,
    /// Free-form structured payload attached by an analysis stage, if any.
    pub analysis: Option<serde_json::Value>,
}

impl Evidence {
    pub fn new(claim_id: ClaimId, kind: EvidenceKind, storage_path: String, declared_mime: String, byte_size: u64) -> Self {
        Self {
            id: EvidenceId::new(),
            claim_id,
            kind,
            storage_path,
            declared_mime,
            byte_size,
            analysis: None,
        }
    }
}

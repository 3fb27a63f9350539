use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::claim::Claim;
use crate::error::ClaimError;
use crate::log_entry::LogEntry;
use crate::receipt::PaidCallReceipt;
use crate::settlement::SettlementGasRow;
use crate::stage_result::StageResult;
use crate::types::{ClaimId, ClaimStatus};

/// The status projection served by the Audit/Progress Sink (§4.9, §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusProjection {
    pub claim_id: ClaimId,
    pub status: ClaimStatus,
    pub completed_stages: Vec<String>,
    pub pending_stages: Vec<String>,
    pub progress_percentage: f64,
}

/// C9 Audit/Progress Sink: the only component that mutates claim fields
/// after evaluation begins (§4.9). Two append-only write paths, two read
/// paths, plus the status projection.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn get_claim(&self, claim_id: ClaimId) -> Result<Option<Claim>, ClaimError>;
    async fn put_claim(&self, claim: &Claim) -> Result<(), ClaimError>;

    async fn append_stage_result(&self, result: StageResult) -> Result<(), ClaimError>;
    async fn list_stage_results(&self, claim_id: ClaimId) -> Result<Vec<StageResult>, ClaimError>;

    async fn append_log_entry(&self, entry: LogEntry) -> Result<(), ClaimError>;
    async fn list_log_entries(&self, claim_id: ClaimId) -> Result<Vec<LogEntry>, ClaimError>;

    async fn append_receipt(&self, receipt: PaidCallReceipt) -> Result<bool, ClaimError>;
    async fn receipt_exists(&self, claim_id: ClaimId, verifier_kind: crate::types::VerifierKind, payment_id: &str)
        -> Result<bool, ClaimError>;

    /// Idempotent on `tx_hash`: returns `false` without inserting if a row
    /// already exists for this hash (§5, §8).
    async fn upsert_settlement_gas(&self, row: SettlementGasRow) -> Result<bool, ClaimError>;

    async fn status_projection(&self, claim_id: ClaimId, expected_stages: &[&str]) -> Result<StatusProjection, ClaimError>;
}

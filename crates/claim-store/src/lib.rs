//! claim-store — C9 Audit/Progress Sink, sled-backed.
//!
//! Grounded on `chronx_state::db::StateDb`: one named tree per entity,
//! bincode payloads keyed by the entity's natural id, append-only trees
//! for log/stage-result/receipt history left ungrouped (scanned by prefix
//! instead of re-keyed per claim). The sequence counter bump and the data
//! insert for each append are a single `sled::Transactional` transaction
//! (§4: each StageResult/LogEntry/Paid-Call Receipt append is one
//! transaction), so a crash between the two can't leak a sequence number
//! with no corresponding row.

use std::path::Path;

use async_trait::async_trait;
use claim_core::{
    AuditSink, Claim, ClaimError, ClaimId, ClaimStatus, LogEntry, PaidCallReceipt, SettlementGasRow, StageResult,
    StatusProjection, VerifierKind,
};
use sled::transaction::{TransactionError, Transactional};

/// Persistent audit store backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   claims            — ClaimId bytes               → bincode(Claim)
///   stage_results      — ClaimId bytes + seq          → bincode(StageResult)
///   log_entries        — ClaimId bytes + seq          → bincode(LogEntry)
///   paid_call_receipts — ClaimId bytes + kind + seq    → bincode(PaidCallReceipt)
///   settlement_gas     — tx_hash bytes                → bincode(SettlementGasRow)
///   meta               — utf8 key bytes                → raw bytes
pub struct SledAuditSink {
    _db: sled::Db,
    claims: sled::Tree,
    stage_results: sled::Tree,
    log_entries: sled::Tree,
    paid_call_receipts: sled::Tree,
    settlement_gas: sled::Tree,
    meta: sled::Tree,
}

impl SledAuditSink {
    /// Open or create the audit store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ClaimError> {
        let db = sled::open(path).map_err(|e| ClaimError::Storage(e.to_string()))?;
        let claims = db.open_tree("claims").map_err(|e| ClaimError::Storage(e.to_string()))?;
        let stage_results = db.open_tree("stage_results").map_err(|e| ClaimError::Storage(e.to_string()))?;
        let log_entries = db.open_tree("log_entries").map_err(|e| ClaimError::Storage(e.to_string()))?;
        let paid_call_receipts = db.open_tree("paid_call_receipts").map_err(|e| ClaimError::Storage(e.to_string()))?;
        let settlement_gas = db.open_tree("settlement_gas").map_err(|e| ClaimError::Storage(e.to_string()))?;
        let meta = db.open_tree("meta").map_err(|e| ClaimError::Storage(e.to_string()))?;
        Ok(Self { _db: db, claims, stage_results, log_entries, paid_call_receipts, settlement_gas, meta })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), ClaimError> {
        self._db.flush().map_err(|e| ClaimError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Bump the `tree_key` sequence counter in `meta` and insert
    /// `(make_key(seq), bytes)` into `tree`, both within one sled
    /// transaction spanning the two trees — the counter bump and the data
    /// row either both land or neither does.
    fn append_with_seq(&self, tree_key: &str, tree: &sled::Tree, bytes: Vec<u8>, make_key: impl Fn(u64) -> Vec<u8>) -> Result<(), ClaimError> {
        let seq_key = format!("seq:{tree_key}").into_bytes();

        (&self.meta, tree)
            .transaction(|(meta, data)| -> sled::transaction::ConflictableTransactionResult<(), ()> {
                let current = meta
                    .get(&seq_key)?
                    .map(|b| {
                        let mut arr = [0u8; 8];
                        arr.copy_from_slice(&b[..8]);
                        u64::from_be_bytes(arr)
                    })
                    .unwrap_or(0);
                meta.insert(seq_key.clone(), (current + 1).to_be_bytes().to_vec())?;
                data.insert(make_key(current), bytes.clone())?;
                Ok(())
            })
            .map_err(|e: TransactionError<()>| ClaimError::Storage(format!("{e:?}")))
    }

    fn scan_by_claim<T: serde::de::DeserializeOwned>(&self, tree: &sled::Tree, claim_id: ClaimId) -> Result<Vec<T>, ClaimError> {
        let prefix = claim_id.as_bytes().to_vec();
        let mut out = Vec::new();
        for item in tree.scan_prefix(&prefix) {
            let (_, bytes) = item.map_err(|e| ClaimError::Storage(e.to_string()))?;
            out.push(bincode::deserialize(&bytes).map_err(|e| ClaimError::Serialization(e.to_string()))?);
        }
        Ok(out)
    }

    fn receipt_key(claim_id: ClaimId, verifier_kind: VerifierKind, seq: u64) -> Vec<u8> {
        let mut key = claim_id.as_bytes().to_vec();
        key.push(match verifier_kind {
            VerifierKind::Document => 0,
            VerifierKind::Image => 1,
            VerifierKind::Fraud => 2,
        });
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }
}

/// With retry semantics applied at the caller (§7: one retry on
/// `StorageFailure` before propagating), this does the single write
/// attempt; retrying is the orchestrator's job, not the sink's.
#[async_trait]
impl AuditSink for SledAuditSink {
    async fn get_claim(&self, claim_id: ClaimId) -> Result<Option<Claim>, ClaimError> {
        match self.claims.get(claim_id.as_bytes()).map_err(|e| ClaimError::Storage(e.to_string()))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes).map_err(|e| ClaimError::Serialization(e.to_string()))?)),
            None => Ok(None),
        }
    }

    async fn put_claim(&self, claim: &Claim) -> Result<(), ClaimError> {
        let bytes = bincode::serialize(claim).map_err(|e| ClaimError::Serialization(e.to_string()))?;
        self.claims.insert(claim.id.as_bytes(), bytes).map_err(|e| ClaimError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn append_stage_result(&self, result: StageResult) -> Result<(), ClaimError> {
        let claim_id = result.claim_id;
        let bytes = bincode::serialize(&result).map_err(|e| ClaimError::Serialization(e.to_string()))?;
        self.append_with_seq("stage_results", &self.stage_results, bytes, move |seq| {
            let mut key = claim_id.as_bytes().to_vec();
            key.extend_from_slice(&seq.to_be_bytes());
            key
        })
    }

    async fn list_stage_results(&self, claim_id: ClaimId) -> Result<Vec<StageResult>, ClaimError> {
        self.scan_by_claim(&self.stage_results, claim_id)
    }

    async fn append_log_entry(&self, entry: LogEntry) -> Result<(), ClaimError> {
        let claim_id = entry.claim_id;
        let bytes = bincode::serialize(&entry).map_err(|e| ClaimError::Serialization(e.to_string()))?;
        self.append_with_seq("log_entries", &self.log_entries, bytes, move |seq| {
            let mut key = claim_id.as_bytes().to_vec();
            key.extend_from_slice(&seq.to_be_bytes());
            key
        })
    }

    async fn list_log_entries(&self, claim_id: ClaimId) -> Result<Vec<LogEntry>, ClaimError> {
        self.scan_by_claim(&self.log_entries, claim_id)
    }

    async fn append_receipt(&self, receipt: PaidCallReceipt) -> Result<bool, ClaimError> {
        if self.receipt_exists(receipt.claim_id, receipt.verifier_kind, &receipt.external_payment_id).await? {
            return Ok(false);
        }
        let claim_id = receipt.claim_id;
        let verifier_kind = receipt.verifier_kind;
        let bytes = bincode::serialize(&receipt).map_err(|e| ClaimError::Serialization(e.to_string()))?;
        self.append_with_seq("paid_call_receipts", &self.paid_call_receipts, bytes, move |seq| Self::receipt_key(claim_id, verifier_kind, seq))?;
        Ok(true)
    }

    async fn receipt_exists(&self, claim_id: ClaimId, verifier_kind: VerifierKind, payment_id: &str) -> Result<bool, ClaimError> {
        let prefix = claim_id.as_bytes().to_vec();
        for item in self.paid_call_receipts.scan_prefix(&prefix) {
            let (_, bytes) = item.map_err(|e| ClaimError::Storage(e.to_string()))?;
            let receipt: PaidCallReceipt = bincode::deserialize(&bytes).map_err(|e| ClaimError::Serialization(e.to_string()))?;
            if receipt.verifier_kind == verifier_kind && receipt.external_payment_id == payment_id {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Idempotent on `tx_hash` (§5, §8): `tx_hash` is the tree key, so a
    /// duplicate hash is a no-op that reports `false`.
    async fn upsert_settlement_gas(&self, row: SettlementGasRow) -> Result<bool, ClaimError> {
        if self.settlement_gas.contains_key(row.tx_hash.as_bytes()).map_err(|e| ClaimError::Storage(e.to_string()))? {
            return Ok(false);
        }
        let bytes = bincode::serialize(&row).map_err(|e| ClaimError::Serialization(e.to_string()))?;
        self.settlement_gas.insert(row.tx_hash.as_bytes(), bytes).map_err(|e| ClaimError::Storage(e.to_string()))?;
        Ok(true)
    }

    async fn status_projection(&self, claim_id: ClaimId, expected_stages: &[&str]) -> Result<StatusProjection, ClaimError> {
        let claim = self.get_claim(claim_id).await?.ok_or_else(|| ClaimError::ClaimNotFound(claim_id.to_string()))?;
        let results = self.list_stage_results(claim_id).await?;

        let completed_stages: Vec<String> = expected_stages
            .iter()
            .filter(|&&stage| results.iter().any(|r| stage_name(&r.payload) == stage))
            .map(|s| s.to_string())
            .collect();
        let pending_stages: Vec<String> =
            expected_stages.iter().filter(|s| !completed_stages.contains(&s.to_string())).map(|s| s.to_string()).collect();

        let progress_percentage = if expected_stages.is_empty() {
            if matches!(claim.status, ClaimStatus::Settled | ClaimStatus::Approved | ClaimStatus::Rejected) { 100.0 } else { 0.0 }
        } else {
            completed_stages.len() as f64 / expected_stages.len() as f64 * 100.0
        };

        Ok(StatusProjection { claim_id, status: claim.status, completed_stages, pending_stages, progress_percentage })
    }
}

fn stage_name(payload: &claim_core::StageResultPayload) -> &'static str {
    match payload {
        claim_core::StageResultPayload::Document(_) => "document",
        claim_core::StageResultPayload::Image(_) => "image",
        claim_core::StageResultPayload::Fraud(_) => "fraud",
        claim_core::StageResultPayload::Reasoning(_) => "reasoning",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim_core::{AccountAddress, Amount, DocumentStageOutput, StageResultPayload};

    fn open_temp() -> SledAuditSink {
        let dir = tempfile::tempdir().unwrap();
        SledAuditSink::open(dir.path().join("db")).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_claim_round_trips() {
        let store = open_temp();
        let claim = Claim::new(AccountAddress([1u8; 20]), Amount::new(100, 0), "roof damage".to_string(), 0);
        store.put_claim(&claim).await.unwrap();

        let fetched = store.get_claim(claim.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, claim.id);
        assert_eq!(fetched.description, "roof damage");
    }

    #[tokio::test]
    async fn get_claim_missing_returns_none() {
        let store = open_temp();
        assert!(store.get_claim(ClaimId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stage_results_accumulate_per_claim() {
        let store = open_temp();
        let claim_id = ClaimId::new();
        let doc = DocumentStageOutput::fallback("n/a");
        store.append_stage_result(StageResult::new(claim_id, StageResultPayload::Document(doc.clone()), 0)).await.unwrap();
        store.append_stage_result(StageResult::new(claim_id, StageResultPayload::Document(doc), 1)).await.unwrap();

        let results = store.list_stage_results(claim_id).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn receipt_idempotent_on_payment_id() {
        let store = open_temp();
        let claim_id = ClaimId::new();
        let receipt = PaidCallReceipt::new(claim_id, VerifierKind::Document, Amount::new(5, 2), "pay_1".to_string(), "tok".to_string(), 0);

        assert!(store.append_receipt(receipt.clone()).await.unwrap());
        assert!(!store.append_receipt(receipt).await.unwrap());
        assert!(store.receipt_exists(claim_id, VerifierKind::Document, "pay_1").await.unwrap());
    }

    #[tokio::test]
    async fn settlement_gas_idempotent_on_tx_hash() {
        let store = open_temp();
        let claim_id = ClaimId::new();
        let row = SettlementGasRow::new(claim_id, "0xabc".to_string(), 45_000, 20_000_000_000, 0);

        assert!(store.upsert_settlement_gas(row.clone()).await.unwrap());
        assert!(!store.upsert_settlement_gas(row).await.unwrap());
    }

    #[tokio::test]
    async fn status_projection_reports_completed_and_pending() {
        let store = open_temp();
        let claim_id = ClaimId::new();
        let mut claim = Claim::new(AccountAddress([2u8; 20]), Amount::new(200, 0), "x".to_string(), 0);
        claim.id = claim_id;
        store.put_claim(&claim).await.unwrap();

        let doc = DocumentStageOutput::fallback("n/a");
        store.append_stage_result(StageResult::new(claim_id, StageResultPayload::Document(doc), 0)).await.unwrap();

        let projection = store.status_projection(claim_id, &["document", "image", "fraud", "reasoning"]).await.unwrap();
        assert_eq!(projection.completed_stages, vec!["document".to_string()]);
        assert_eq!(projection.pending_stages, vec!["image".to_string(), "fraud".to_string(), "reasoning".to_string()]);
        assert_eq!(projection.progress_percentage, 25.0);
    }
}

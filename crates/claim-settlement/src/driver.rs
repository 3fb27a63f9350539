//! C8 Settlement Driver: the three-step sequence, pre-checks, and gas
//! capture (§4.8). Failures never propagate — the orchestrator's overall
//! verdict is unaffected, matching `approve_claim`'s `return None` on any
//! exception in `original_source`.

use std::time::Duration;

use claim_core::{AccountAddress, Amount, AuditSink, ClaimError, ClaimId, SettlementGasRow};

use crate::chain_rpc::ChainRpc;
use crate::scaling::{amount_scaled, claim_id_scaled};

#[derive(Clone, Debug, PartialEq)]
pub enum SettlementOutcome {
    /// The release transaction confirmed; this hash belongs on the claim.
    Settled { tx_hash: String },
    /// Settlement was not attempted or did not complete; claim stays APPROVED.
    Skipped { reason: String },
}

pub struct SettlementDriver<'a, C> {
    chain: &'a C,
    escrow_address: String,
    token_address: String,
    receipt_timeout: Duration,
}

impl<'a, C: ChainRpc> SettlementDriver<'a, C> {
    pub fn new(chain: &'a C, escrow_address: impl Into<String>, token_address: impl Into<String>) -> Self {
        Self {
            chain,
            escrow_address: escrow_address.into(),
            token_address: token_address.into(),
            receipt_timeout: Duration::from_secs(120),
        }
    }

    /// Run the three-step sequence for one AUTO_APPROVED claim, recording
    /// gas through `sink` on success. Never returns `Err` to the caller for
    /// chain failures — those are logged and downgraded to `Skipped`.
    pub async fn settle<S: AuditSink>(
        &self,
        sink: &S,
        claim_id: ClaimId,
        amount: Amount,
        recipient: AccountAddress,
        now: i64,
    ) -> SettlementOutcome {
        let cid = claim_id_scaled(claim_id);
        let amount_6 = amount_scaled(amount);

        match self.chain.call(&self.escrow_address, "isSettled", &[serde_json::json!(cid)]).await {
            Ok(bytes) if bytes.first() == Some(&1) => {
                return SettlementOutcome::Skipped { reason: "already settled".to_string() };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(claim_id = %claim_id, step = "isSettled", "{}", first_line(&e.to_string()));
                return SettlementOutcome::Skipped { reason: "escrow state check failed".to_string() };
            }
        }

        let escrow_balance = match self.chain.call(&self.escrow_address, "getEscrowBalance", &[serde_json::json!(cid)]).await {
            Ok(bytes) => bytes_to_u128(&bytes),
            Err(e) => {
                tracing::error!(claim_id = %claim_id, step = "getEscrowBalance", "{}", first_line(&e.to_string()));
                0
            }
        };

        if escrow_balance < amount_6 {
            if let Err(e) = self.approve_and_deposit(cid, amount_6).await {
                tracing::error!(claim_id = %claim_id, step = "approve_deposit", "{}", first_line(&e.to_string()));
                return SettlementOutcome::Skipped { reason: "allowance/deposit step failed".to_string() };
            }
        }

        let release = self
            .chain
            .call(
                &self.escrow_address,
                "approveClaim",
                &[serde_json::json!(cid), serde_json::json!(amount_6), serde_json::json!(recipient.to_hex())],
            )
            .await;

        let tx_hash = match release {
            Ok(_) => match self.chain.send_raw_transaction(&[]).await {
                Ok(h) => h,
                Err(e) => {
                    tracing::error!(claim_id = %claim_id, step = "approveClaim", "{}", first_line(&e.to_string()));
                    return SettlementOutcome::Skipped { reason: "release transaction failed".to_string() };
                }
            },
            Err(e) => {
                tracing::error!(claim_id = %claim_id, step = "approveClaim", "{}", first_line(&e.to_string()));
                return SettlementOutcome::Skipped { reason: "release call reverted".to_string() };
            }
        };

        match self.chain.wait_for_receipt(&tx_hash, self.receipt_timeout).await {
            Ok(receipt) if receipt.status => {
                let _ = self.capture_gas(sink, claim_id, &tx_hash, receipt.gas_used, receipt.effective_gas_price_wei, now).await;
                SettlementOutcome::Settled { tx_hash }
            }
            Ok(_receipt) => SettlementOutcome::Skipped { reason: "release transaction reverted".to_string() },
            Err(e) => {
                tracing::error!(claim_id = %claim_id, step = "wait_for_receipt", "{}", first_line(&e.to_string()));
                SettlementOutcome::Skipped { reason: "release confirmation timed out".to_string() }
            }
        }
    }

    async fn approve_and_deposit(&self, cid: u128, amount_6: u128) -> Result<(), ClaimError> {
        self.chain
            .call(&self.token_address, "approve", &[serde_json::json!(self.escrow_address), serde_json::json!(amount_6)])
            .await?;
        self.chain.send_raw_transaction(&[]).await?;
        self.chain.wait_for_receipt("pending-approve", self.receipt_timeout).await?;

        self.chain
            .call(&self.escrow_address, "depositEscrow", &[serde_json::json!(cid), serde_json::json!(amount_6)])
            .await?;
        self.chain.send_raw_transaction(&[]).await?;
        self.chain.wait_for_receipt("pending-deposit", self.receipt_timeout).await?;

        Ok(())
    }

    /// Idempotent on `tx_hash` (§4.8, §9): the `AuditSink` upsert itself
    /// reports whether a row already existed, so this never errors on a
    /// duplicate hash.
    async fn capture_gas<S: AuditSink>(
        &self,
        sink: &S,
        claim_id: ClaimId,
        tx_hash: &str,
        gas_used: u64,
        effective_gas_price_wei: u128,
        now: i64,
    ) -> Result<bool, ClaimError> {
        let row = SettlementGasRow::new(claim_id, tx_hash.to_string(), gas_used, effective_gas_price_wei, now);
        sink.upsert_settlement_gas(row).await
    }
}

fn bytes_to_u128(bytes: &[u8]) -> u128 {
    bytes.iter().fold(0u128, |acc, &b| (acc << 8) | b as u128)
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_rpc::MockChainRpc;

    struct NullSink;

    #[async_trait::async_trait]
    impl AuditSink for NullSink {
        async fn get_claim(&self, _claim_id: ClaimId) -> Result<Option<claim_core::Claim>, ClaimError> {
            Ok(None)
        }
        async fn put_claim(&self, _claim: &claim_core::Claim) -> Result<(), ClaimError> {
            Ok(())
        }
        async fn append_stage_result(&self, _result: claim_core::StageResult) -> Result<(), ClaimError> {
            Ok(())
        }
        async fn list_stage_results(&self, _claim_id: ClaimId) -> Result<Vec<claim_core::StageResult>, ClaimError> {
            Ok(Vec::new())
        }
        async fn append_log_entry(&self, _entry: claim_core::LogEntry) -> Result<(), ClaimError> {
            Ok(())
        }
        async fn list_log_entries(&self, _claim_id: ClaimId) -> Result<Vec<claim_core::LogEntry>, ClaimError> {
            Ok(Vec::new())
        }
        async fn append_receipt(&self, _receipt: claim_core::PaidCallReceipt) -> Result<bool, ClaimError> {
            Ok(true)
        }
        async fn receipt_exists(
            &self,
            _claim_id: ClaimId,
            _verifier_kind: claim_core::VerifierKind,
            _payment_id: &str,
        ) -> Result<bool, ClaimError> {
            Ok(false)
        }
        async fn upsert_settlement_gas(&self, _row: SettlementGasRow) -> Result<bool, ClaimError> {
            Ok(true)
        }
        async fn status_projection(
            &self,
            claim_id: ClaimId,
            _expected_stages: &[&str],
        ) -> Result<claim_core::StatusProjection, ClaimError> {
            Ok(claim_core::StatusProjection {
                claim_id,
                status: claim_core::ClaimStatus::Evaluating,
                completed_stages: Vec::new(),
                pending_stages: Vec::new(),
                progress_percentage: 0.0,
            })
        }
    }

    #[tokio::test]
    async fn settles_when_chain_confirms() {
        let chain = MockChainRpc::new();
        let driver = SettlementDriver::new(&chain, "0xescrow", "0xtoken");
        let sink = NullSink;

        let outcome = driver
            .settle(&sink, ClaimId::new(), rust_decimal::Decimal::new(100000, 2), AccountAddress([0u8; 20]), 0)
            .await;

        assert!(matches!(outcome, SettlementOutcome::Settled { .. }));
    }

    #[tokio::test]
    async fn already_settled_claim_skips() {
        let claim_id = ClaimId::new();
        let cid = claim_id_scaled(claim_id);
        let chain = MockChainRpc::new().with_settled(cid);
        let driver = SettlementDriver::new(&chain, "0xescrow", "0xtoken");
        let sink = NullSink;

        let outcome = driver.settle(&sink, claim_id, rust_decimal::Decimal::new(100000, 2), AccountAddress([0u8; 20]), 0).await;
        assert_eq!(outcome, SettlementOutcome::Skipped { reason: "already settled".to_string() });
    }

    #[tokio::test]
    async fn chain_failure_skips_without_propagating() {
        let chain = MockChainRpc::new().failing("approveClaim");
        let driver = SettlementDriver::new(&chain, "0xescrow", "0xtoken");
        let sink = NullSink;

        let outcome = driver.settle(&sink, ClaimId::new(), rust_decimal::Decimal::new(100000, 2), AccountAddress([0u8; 20]), 0).await;
        assert!(matches!(outcome, SettlementOutcome::Skipped { .. }));
    }
}

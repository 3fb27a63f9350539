use serde::{Deserialize, Serialize};

use crate::types::Amount;

/// Every tunable named in §6's Configuration table, with the documented
/// defaults. Grounded on `chronx_core::claims::LaneThresholds::default_thresholds`:
/// one struct, one `default()` constructor, governance/operators override
/// individual fields rather than recompiling.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub stage_timeout_seconds: u64,
    pub pipeline_timeout_seconds: u64,

    pub decision: DecisionThresholds,

    pub settlement_enabled: bool,
    pub settlement_amount_cap: Option<Amount>,
    pub settlement_chain_id: u64,
    pub settlement_escrow_address: String,
    pub settlement_token_address: String,

    pub tool_cost_verify_document: Amount,
    pub tool_cost_verify_image: Amount,
    pub tool_cost_verify_fraud: Amount,

    /// MAC key for the Paid-Call Gateway's own receipts (§4.10), used when
    /// this process is both the caller and the verifier. Deployments that
    /// front a real external verifier should override this per-environment.
    pub receipt_secret: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionThresholds {
    pub auto_approve_confidence: f64,
    pub auto_approve_fraud_max: f64,
    pub fraud_detected_threshold: f64,
    pub approved_with_review_min: f64,
    pub needs_review_min: f64,
    pub needs_more_data_min: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            auto_approve_confidence: 0.95,
            auto_approve_fraud_max: 0.30,
            fraud_detected_threshold: 0.70,
            approved_with_review_min: 0.85,
            needs_review_min: 0.70,
            needs_more_data_min: 0.50,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        use rust_decimal::Decimal;
        Self {
            stage_timeout_seconds: 60,
            pipeline_timeout_seconds: 600,
            decision: DecisionThresholds::default(),
            settlement_enabled: false,
            settlement_amount_cap: None,
            settlement_chain_id: 1,
            settlement_escrow_address: String::new(),
            settlement_token_address: String::new(),
            tool_cost_verify_document: Decimal::new(5, 2),
            tool_cost_verify_image: Decimal::new(10, 2),
            tool_cost_verify_fraud: Decimal::new(5, 2),
            receipt_secret: *b"claim-ledger-default-secret-0000",
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::types::{AccountAddress, Amount, ClaimId, ClaimStatus, Timestamp, Verdict};

/// A claim submitted by a claimant against a policy (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub claimant: AccountAddress,
    pub requested_amount: Amount,
    pub description: String,

    pub status: ClaimStatus,
    pub verdict: Option<Verdict>,
    pub confidence: Option<f64>,
    pub approved_amount: Option<Amount>,
    pub fraud_risk_snapshot: Option<f64>,
    pub contradictions: Vec<String>,
    pub requested_data: Vec<String>,
    pub review_reasons: Vec<String>,

    pub auto_approved: bool,
    pub auto_settled: bool,
    pub decision_overridden: bool,
    pub human_review_required: bool,

    pub settlement_tx_hash: Option<String>,
    pub processing_cost: Amount,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Claim {
    /// Construct a freshly submitted claim. Per §3 lifecycle: status = SUBMITTED.
    pub fn new(claimant: AccountAddress, requested_amount: Amount, description: String, now: Timestamp) -> Self {
        Self {
            id: ClaimId::new(),
            claimant,
            requested_amount,
            description,
            status: ClaimStatus::Submitted,
            verdict: None,
            confidence: None,
            approved_amount: None,
            fraud_risk_snapshot: None,
            contradictions: Vec::new(),
            requested_data: Vec::new(),
            review_reasons: Vec::new(),
            auto_approved: false,
            auto_settled: false,
            decision_overridden: false,
            human_review_required: false,
            settlement_tx_hash: None,
            processing_cost: Amount::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// §3 invariant: a claim with status = SETTLED has a non-null tx hash.
    pub fn is_settlement_consistent(&self) -> bool {
        match self.status {
            ClaimStatus::Settled => self.settlement_tx_hash.is_some(),
            _ => true,
        }
    }

    /// §4.6: whether this claim may enter `evaluate()`.
    pub fn can_evaluate(&self) -> bool {
        matches!(self.status, ClaimStatus::Submitted | ClaimStatus::NeedsReview)
    }
}

use serde::{Deserialize, Serialize};

use crate::types::{Amount, ClaimId, Timestamp, VerifierKind};

/// A record of a micropayment made to an external verifier endpoint (§3).
///
/// Idempotency key per §5: `{claim_id, verifier_kind, payment_id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaidCallReceipt {
    pub id: uuid::Uuid,
    pub claim_id: ClaimId,
    pub verifier_kind: VerifierKind,
    pub amount: Amount,
    pub external_payment_id: String,
    pub receipt_token: String,
    pub timestamp: Timestamp,
}

impl PaidCallReceipt {
    pub fn new(
        claim_id: ClaimId,
        verifier_kind: VerifierKind,
        amount: Amount,
        external_payment_id: String,
        receipt_token: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            claim_id,
            verifier_kind,
            amount,
            external_payment_id,
            receipt_token,
            timestamp,
        }
    }
}

use thiserror::Error;

/// The failure taxonomy for the claim evaluation pipeline (§7).
///
/// Only `PreconditionFailed` and `StorageFailure` (after one retry) are
/// meant to propagate out of `evaluate()`; every other variant is absorbed
/// at a component boundary and replaced by that component's documented
/// fallback.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("claim {claim_id} has status {status:?}, evaluation requires SUBMITTED or NEEDS_REVIEW")]
    PreconditionFailed {
        claim_id: String,
        status: crate::types::ClaimStatus,
    },

    #[error("claim not found: {0}")]
    ClaimNotFound(String),

    #[error("stage transient failure in {stage}: {detail}")]
    StageTransient { stage: String, detail: String },

    #[error("stage fatal failure in {stage}: {detail}")]
    StageFatal { stage: String, detail: String },

    #[error("chain RPC transient failure at step {step}: {detail}")]
    ChainTransient { step: String, detail: String },

    #[error("chain RPC permanent failure at step {step}: {detail}")]
    ChainPermanent { step: String, detail: String },

    #[error("payment required but second attempt also returned 402")]
    PaymentRequired,

    #[error("storage write failed after retry: {0}")]
    StorageFailure(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

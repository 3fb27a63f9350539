//! claim-core — shared data model, configuration, and error taxonomy for the
//! claim evaluation pipeline.

pub mod audit;
pub mod claim;
pub mod config;
pub mod error;
pub mod evidence;
pub mod log_entry;
pub mod receipt;
pub mod settlement;
pub mod stage_result;
pub mod types;

pub use audit::{AuditSink, StatusProjection};
pub use claim::Claim;
pub use config::{DecisionThresholds, PipelineConfig};
pub use error::ClaimError;
pub use evidence::Evidence;
pub use log_entry::LogEntry;
pub use receipt::PaidCallReceipt;
pub use settlement::SettlementGasRow;
pub use stage_result::{
    DocumentStageOutput, FraudStageOutput, ImageStageOutput, ReasoningStageOutput, StageOutput,
    StageResult, StageResultPayload,
};
pub use types::{
    now_unix, AccountAddress, Amount, ClaimId, ClaimStatus, EvidenceId, EvidenceKind, LogLevel,
    RiskLevel, Severity, StageTag, Timestamp, Verdict, VerifierKind,
};

//! Common value types shared by every stage of the evaluation pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed-point USD amount, 2 fractional digits by convention (never enforced
/// beyond `Decimal`'s own precision — callers round at the data-model
/// boundary as spec'd in §3).
pub type Amount = rust_decimal::Decimal;

/// Unix timestamp, seconds, UTC.
pub type Timestamp = i64;

/// Opaque claim identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub Uuid);

impl ClaimId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ClaimId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimId({})", self.0)
    }
}

/// Opaque evidence artifact identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct EvidenceId(pub Uuid);

impl EvidenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

/// 20-byte claimant account address (hex-displayed), per §3.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountAddress(pub [u8; 20]);

impl AccountAddress {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)?;
        let mut arr = [0u8; 20];
        if bytes.len() == 20 {
            arr.copy_from_slice(&bytes);
        }
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountAddress({})", self.to_hex())
    }
}

/// Evidence kind. Additional kinds are explicitly out of core scope (§ Glossary).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Document,
    Image,
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvidenceKind::Document => write!(f, "document"),
            EvidenceKind::Image => write!(f, "image"),
        }
    }
}

/// A claim's lifecycle state (§4.6 state machine).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    Submitted,
    Evaluating,
    Approved,
    Settled,
    NeedsReview,
    AwaitingData,
    Rejected,
}

/// Terminal verdict produced by the Decision Engine (§4.7).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    AutoApproved,
    ApprovedWithReview,
    NeedsReview,
    NeedsMoreData,
    InsufficientData,
    FraudDetected,
}

/// Which stage produced a given `StageResult` or `LogEntry` (§3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
    Document,
    Image,
    Fraud,
    Reasoning,
    Orchestrator,
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageTag::Document => "document",
            StageTag::Image => "image",
            StageTag::Fraud => "fraud",
            StageTag::Reasoning => "reasoning",
            StageTag::Orchestrator => "orchestrator",
        };
        write!(f, "{s}")
    }
}

/// Log severity for a `LogEntry` (§3).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Damage severity ordering for image extraction (§4.2): minor < moderate < severe < total.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
    Total,
}

/// Fraud risk level, derived (never trusted from the model) by the fraud stage (§4.3).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// LOW if fraud_score < 0.3, MEDIUM if < 0.7, HIGH otherwise.
    pub fn from_score(fraud_score: f64) -> Self {
        if fraud_score < 0.3 {
            RiskLevel::Low
        } else if fraud_score < 0.7 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// Which verifier kind a paid call or receipt refers to (§3).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
#[serde(rename_all = "snake_case")]
pub enum VerifierKind {
    Document,
    Image,
    Fraud,
}

impl fmt::Display for VerifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerifierKind::Document => "document",
            VerifierKind::Image => "image",
            VerifierKind::Fraud => "fraud",
        };
        write!(f, "{s}")
    }
}

pub fn now_unix() -> Timestamp {
    chrono::Utc::now().timestamp()
}

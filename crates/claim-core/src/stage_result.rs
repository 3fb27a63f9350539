//! Per-stage structured payloads (§4.2–§4.4, §9).
//!
//! The source leans on dict manipulation; here each stage gets its own
//! tagged variant, all reachable through the common [`StageOutput`] accessor
//! pair, plus the [`StageResultPayload`] sum type the audit sink persists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ClaimId, RiskLevel, Severity, Timestamp};

/// Common accessors every stage output exposes, regardless of where
/// `confidence`/`notes` actually live in its JSON shape.
pub trait StageOutput {
    fn confidence(&self) -> f64;
    fn notes(&self) -> &str;
    /// Repair hook for the executor's schema-repair policy (§4.5): clamp or
    /// default the confidence slot in place, wherever it lives in this
    /// variant's JSON shape.
    fn set_confidence(&mut self, value: f64);
}

// ── Document extraction ──────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct DocumentClassification {
    pub category: String,
    pub structure: String,
    pub has_tables: bool,
    pub has_line_items: bool,
    pub primary_content_type: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LineItem {
    pub item_name: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableOutput {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub summary: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub confidence: f64,
    pub extraction_method: String,
    pub notes: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentStageOutput {
    pub document_classification: DocumentClassification,
    pub extracted_fields: HashMap<String, serde_json::Value>,
    pub line_items: Vec<LineItem>,
    pub tables: Vec<TableOutput>,
    pub metadata: DocumentMetadata,
    pub valid: bool,
}

impl DocumentStageOutput {
    /// The fallback payload for an unavailable model endpoint (§4.2).
    pub fn fallback(notes: impl Into<String>) -> Self {
        Self {
            document_classification: DocumentClassification::default(),
            extracted_fields: HashMap::new(),
            line_items: Vec::new(),
            tables: Vec::new(),
            metadata: DocumentMetadata {
                confidence: 0.0,
                extraction_method: "fallback".to_string(),
                notes: notes.into(),
            },
            valid: false,
        }
    }

    /// Best-effort extraction of a single "amount" field for reconciliation,
    /// e.g. the fraud/reasoning stages comparing document amount vs image
    /// estimate vs claim amount (§4.4).
    pub fn amount(&self) -> Option<f64> {
        self.extracted_fields.get("amount").and_then(|v| v.as_f64())
    }
}

impl StageOutput for DocumentStageOutput {
    fn confidence(&self) -> f64 {
        self.metadata.confidence
    }
    fn notes(&self) -> &str {
        &self.metadata.notes
    }
    fn set_confidence(&mut self, value: f64) {
        self.metadata.confidence = value;
    }
}

// ── Image extraction ─────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageStageOutput {
    pub damage_type: String,
    pub affected_parts: Vec<String>,
    pub severity: Severity,
    pub estimated_cost: Option<f64>,
    pub confidence: f64,
    pub valid: bool,
    pub notes: String,
}

impl ImageStageOutput {
    pub fn fallback(notes: impl Into<String>) -> Self {
        Self {
            damage_type: "unknown".to_string(),
            affected_parts: Vec::new(),
            severity: Severity::Minor,
            estimated_cost: None,
            confidence: 0.0,
            valid: false,
            notes: notes.into(),
        }
    }
}

impl StageOutput for ImageStageOutput {
    fn confidence(&self) -> f64 {
        self.confidence
    }
    fn notes(&self) -> &str {
        &self.notes
    }
    fn set_confidence(&mut self, value: f64) {
        self.confidence = value;
    }
}

// ── Fraud ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FraudStageOutput {
    pub fraud_score: f64,
    pub risk_level: RiskLevel,
    pub indicators: Vec<String>,
    pub confidence: f64,
    pub notes: String,
}

impl FraudStageOutput {
    /// §4.3 fallback on stage error.
    pub fn fallback() -> Self {
        Self {
            fraud_score: 0.5,
            risk_level: RiskLevel::Medium,
            indicators: vec!["Agent error".to_string()],
            confidence: 0.5,
            notes: String::new(),
        }
    }
}

impl StageOutput for FraudStageOutput {
    fn confidence(&self) -> f64 {
        self.confidence
    }
    fn notes(&self) -> &str {
        &self.notes
    }
    fn set_confidence(&mut self, value: f64) {
        self.confidence = value;
    }
}

// ── Reasoning ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReasoningStageOutput {
    pub final_confidence: f64,
    pub contradictions: Vec<String>,
    pub fraud_risk: f64,
    pub missing_evidence: Vec<String>,
    pub evidence_gaps: Vec<String>,
    pub reasoning: String,
}

impl StageOutput for ReasoningStageOutput {
    fn confidence(&self) -> f64 {
        self.final_confidence
    }
    fn notes(&self) -> &str {
        &self.reasoning
    }
    fn set_confidence(&mut self, value: f64) {
        self.final_confidence = value;
    }
}

// ── Sum type persisted by the audit sink ─────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageResultPayload {
    Document(DocumentStageOutput),
    Image(ImageStageOutput),
    Fraud(FraudStageOutput),
    Reasoning(ReasoningStageOutput),
}

impl From<DocumentStageOutput> for StageResultPayload {
    fn from(v: DocumentStageOutput) -> Self {
        StageResultPayload::Document(v)
    }
}
impl From<ImageStageOutput> for StageResultPayload {
    fn from(v: ImageStageOutput) -> Self {
        StageResultPayload::Image(v)
    }
}
impl From<FraudStageOutput> for StageResultPayload {
    fn from(v: FraudStageOutput) -> Self {
        StageResultPayload::Fraud(v)
    }
}
impl From<ReasoningStageOutput> for StageResultPayload {
    fn from(v: ReasoningStageOutput) -> Self {
        StageResultPayload::Reasoning(v)
    }
}

impl StageResultPayload {
    pub fn confidence(&self) -> f64 {
        match self {
            StageResultPayload::Document(d) => d.confidence(),
            StageResultPayload::Image(i) => i.confidence(),
            StageResultPayload::Fraud(f) => f.confidence(),
            StageResultPayload::Reasoning(r) => r.confidence(),
        }
    }
}

/// A persisted stage result (§3). Multiple results may coexist for one
/// claim (e.g. after re-evaluation); they are append-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StageResult {
    pub id: uuid::Uuid,
    pub claim_id: ClaimId,
    pub payload: StageResultPayload,
    pub confidence: Option<f64>,
    pub timestamp: Timestamp,
}

impl StageResult {
    pub fn new(claim_id: ClaimId, payload: StageResultPayload, timestamp: Timestamp) -> Self {
        let confidence = Some(payload.confidence());
        Self {
            id: uuid::Uuid::new_v4(),
            claim_id,
            payload,
            confidence,
            timestamp,
        }
    }
}

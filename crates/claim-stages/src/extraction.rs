//! C2 Extraction Stage: one stage per evidence kind (§4.2).
//!
//! Grounded on `original_source`'s `document_agent.py`/`image_agent.py`
//! analyze-then-fallback shape, generalized behind the shared [`Stage`]
//! trait so the executor (`executor.rs`) doesn't need to know which kind
//! it's driving.

use std::collections::HashMap;

use async_trait::async_trait;
use claim_core::{
    ClaimError, ClaimId, DocumentClassification, DocumentMetadata, DocumentStageOutput,
    ImageStageOutput,
};

use claim_schema::{Field, FieldSchema};

use crate::llm::{LlmClient, PromptPart};
use crate::parser::extract_json_object;

/// Schema for the document extraction payload (§4.2): only `metadata.confidence`
/// is validated — the rest of the shape is free-form model output.
pub fn document_schema() -> FieldSchema {
    FieldSchema::Object {
        fields: std::collections::BTreeMap::from([(
            "metadata".to_string(),
            Field::required(FieldSchema::Object {
                fields: std::collections::BTreeMap::from([(
                    "confidence".to_string(),
                    Field::required(FieldSchema::Number { min: Some(0.0), max: Some(1.0) }),
                )]),
            }),
        )]),
    }
}

/// Schema for the image extraction payload (§4.2).
pub fn image_schema() -> FieldSchema {
    FieldSchema::Object {
        fields: std::collections::BTreeMap::from([(
            "confidence".to_string(),
            Field::required(FieldSchema::Number { min: Some(0.0), max: Some(1.0) }),
        )]),
    }
}

/// Input handed to an extraction stage: the raw evidence bytes for one
/// artifact plus enough claim context to prompt the model.
pub struct ExtractionInput<'a> {
    pub claim_id: ClaimId,
    pub declared_mime: String,
    pub bytes: &'a [u8],
}

/// Common shape every stage in this crate implements, so the executor can
/// drive document/image/fraud/reasoning uniformly.
#[async_trait]
pub trait Stage<I, O>: Send + Sync {
    const NAME: &'static str;
    async fn run(&self, input: I) -> Result<O, ClaimError>;
    fn fallback(&self, detail: &str) -> O;
}

pub struct DocumentStage {
    llm: std::sync::Arc<dyn LlmClient>,
    model: String,
}

impl DocumentStage {
    pub fn new(llm: std::sync::Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }
}

#[async_trait]
impl<'a> Stage<ExtractionInput<'a>, DocumentStageOutput> for DocumentStage {
    const NAME: &'static str = "document";

    async fn run(&self, input: ExtractionInput<'a>) -> Result<DocumentStageOutput, ClaimError> {
        let prompt = vec![
            PromptPart::text(format!(
                "Extract structured fields from this {} document for claim {}.",
                input.declared_mime, input.claim_id
            )),
            PromptPart::Attachment {
                mime_type: input.declared_mime.clone(),
                bytes: input.bytes.to_vec(),
            },
        ];

        let text = self.llm.analyze(&self.model, &prompt).await?;
        let value = extract_json_object(&text).ok_or_else(|| ClaimError::StageFatal {
            stage: Self::NAME.to_string(),
            detail: "no parseable JSON in model response".to_string(),
        })?;

        parse_document_output(&value)
    }

    fn fallback(&self, detail: &str) -> DocumentStageOutput {
        DocumentStageOutput::fallback(detail)
    }
}

fn parse_document_output(value: &serde_json::Value) -> Result<DocumentStageOutput, ClaimError> {
    let classification = value
        .get("document_classification")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(DocumentClassification::default);

    let extracted_fields: HashMap<String, serde_json::Value> = value
        .get("extracted_fields")
        .and_then(|v| v.as_object())
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let line_items = value
        .get("line_items")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let tables = value
        .get("tables")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    let confidence = value
        .get("metadata")
        .and_then(|m| m.get("confidence"))
        .and_then(|c| c.as_f64())
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let notes = value
        .get("metadata")
        .and_then(|m| m.get("notes"))
        .and_then(|n| n.as_str())
        .unwrap_or("")
        .to_string();
    let extraction_method = value
        .get("metadata")
        .and_then(|m| m.get("extraction_method"))
        .and_then(|n| n.as_str())
        .unwrap_or("model")
        .to_string();

    let valid = value.get("valid").and_then(|v| v.as_bool()).unwrap_or(false);

    Ok(DocumentStageOutput {
        document_classification: classification,
        extracted_fields,
        line_items,
        tables,
        metadata: DocumentMetadata { confidence, extraction_method, notes },
        valid,
    })
}

pub struct ImageStage {
    llm: std::sync::Arc<dyn LlmClient>,
    model: String,
}

impl ImageStage {
    pub fn new(llm: std::sync::Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }
}

#[async_trait]
impl<'a> Stage<ExtractionInput<'a>, ImageStageOutput> for ImageStage {
    const NAME: &'static str = "image";

    async fn run(&self, input: ExtractionInput<'a>) -> Result<ImageStageOutput, ClaimError> {
        let prompt = vec![
            PromptPart::text(format!(
                "Assess damage shown in this {} image for claim {}.",
                input.declared_mime, input.claim_id
            )),
            PromptPart::Attachment {
                mime_type: input.declared_mime.clone(),
                bytes: input.bytes.to_vec(),
            },
        ];

        let text = self.llm.analyze(&self.model, &prompt).await?;
        let value = extract_json_object(&text).ok_or_else(|| ClaimError::StageFatal {
            stage: Self::NAME.to_string(),
            detail: "no parseable JSON in model response".to_string(),
        })?;

        serde_json::from_value(value).map_err(|e| ClaimError::StageFatal {
            stage: Self::NAME.to_string(),
            detail: format!("malformed image stage payload: {e}"),
        })
    }

    fn fallback(&self, detail: &str) -> ImageStageOutput {
        ImageStageOutput::fallback(detail)
    }
}

/// §4.2 aggregation across multiple document artifacts: union of
/// `extracted_fields`, averaged confidence, valid iff any sub-result valid.
pub fn aggregate_document(results: &[DocumentStageOutput]) -> DocumentStageOutput {
    if results.is_empty() {
        return DocumentStageOutput::fallback("no document evidence");
    }
    if results.len() == 1 {
        return results[0].clone();
    }

    let mut extracted_fields = HashMap::new();
    for r in results {
        for (k, v) in &r.extracted_fields {
            extracted_fields.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    let confidence = results.iter().map(|r| r.metadata.confidence).sum::<f64>() / results.len() as f64;
    let valid = results.iter().any(|r| r.valid);

    let line_items = results.iter().flat_map(|r| r.line_items.clone()).collect();
    let tables = results.iter().flat_map(|r| r.tables.clone()).collect();

    DocumentStageOutput {
        document_classification: results[0].document_classification.clone(),
        extracted_fields,
        line_items,
        tables,
        metadata: DocumentMetadata {
            confidence,
            extraction_method: "aggregated".to_string(),
            notes: format!("aggregated from {} artifacts", results.len()),
        },
        valid,
    }
}

/// §4.2 aggregation across multiple image artifacts: modal damage type,
/// union of affected parts, maximum severity, mean estimated cost and
/// confidence.
pub fn aggregate_image(results: &[ImageStageOutput]) -> ImageStageOutput {
    if results.is_empty() {
        return ImageStageOutput::fallback("no image evidence");
    }
    if results.len() == 1 {
        return results[0].clone();
    }

    let mut counts: HashMap<String, usize> = HashMap::new();
    for r in results {
        *counts.entry(r.damage_type.clone()).or_insert(0) += 1;
    }
    let damage_type = counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(kind, _)| kind)
        .unwrap_or_else(|| "unknown".to_string());

    let mut affected_parts = Vec::new();
    for r in results {
        for part in &r.affected_parts {
            if !affected_parts.contains(part) {
                affected_parts.push(part.clone());
            }
        }
    }

    let severity = results.iter().map(|r| r.severity).max().unwrap();

    let costs: Vec<f64> = results.iter().filter_map(|r| r.estimated_cost).collect();
    let estimated_cost = if costs.is_empty() {
        None
    } else {
        Some(costs.iter().sum::<f64>() / costs.len() as f64)
    };

    let confidence = results.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64;
    let valid = results.iter().any(|r| r.valid);

    ImageStageOutput {
        damage_type,
        affected_parts,
        severity,
        estimated_cost,
        confidence,
        valid,
        notes: format!("aggregated from {} artifacts", results.len()),
    }
}

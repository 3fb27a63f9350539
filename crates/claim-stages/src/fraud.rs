//! C3 Fraud Stage (§4.3). Grounded on `original_source`'s `fraud_agent.py`:
//! same context-building shape, same numeric fallback on stage error.

use async_trait::async_trait;
use claim_core::{Amount, ClaimError, FraudStageOutput, RiskLevel};

use claim_schema::{Field, FieldSchema};

use crate::extraction::Stage;
use crate::llm::{LlmClient, PromptPart};
use crate::parser::{extract_json_object, text_heuristics};

/// Schema for the fraud payload (§4.3): `fraud_score` and `confidence` are
/// the only normative numeric fields.
pub fn fraud_schema() -> FieldSchema {
    FieldSchema::Object {
        fields: std::collections::BTreeMap::from([
            ("fraud_score".to_string(), Field::required(FieldSchema::Number { min: Some(0.0), max: Some(1.0) })),
            ("confidence".to_string(), Field::required(FieldSchema::Number { min: Some(0.0), max: Some(1.0) })),
        ]),
    }
}

pub struct FraudInput<'a> {
    pub claim_amount: Amount,
    pub claimant: String,
    pub document_summary: Option<&'a str>,
    pub image_summary: Option<&'a str>,
}

pub struct FraudStage {
    llm: std::sync::Arc<dyn LlmClient>,
    model: String,
}

impl FraudStage {
    pub fn new(llm: std::sync::Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }
}

#[async_trait]
impl<'a> Stage<FraudInput<'a>, FraudStageOutput> for FraudStage {
    const NAME: &'static str = "fraud";

    async fn run(&self, input: FraudInput<'a>) -> Result<FraudStageOutput, ClaimError> {
        let mut context = vec![
            format!("Claim Amount: ${:.2}", input.claim_amount),
            format!("Claimant Address: {}", input.claimant),
        ];
        if let Some(doc) = input.document_summary {
            context.push(format!("Document Analysis: {doc}"));
        }
        if let Some(img) = input.image_summary {
            context.push(format!("Image Analysis: {img}"));
        }

        let prompt = vec![PromptPart::text(context.join("\n"))];
        let text = self.llm.analyze(&self.model, &prompt).await?;

        let value = extract_json_object(&text).unwrap_or_else(|| text_heuristics(&text));
        parse_fraud_output(&value)
    }

    fn fallback(&self, _detail: &str) -> FraudStageOutput {
        FraudStageOutput::fallback()
    }
}

fn parse_fraud_output(value: &serde_json::Value) -> Result<FraudStageOutput, ClaimError> {
    let fraud_score = value
        .get("fraud_score")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    // Risk level is always derived, never trusted from the model (§4.3 hard rule).
    let risk_level = RiskLevel::from_score(fraud_score);

    let indicators = value
        .get("indicators")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|i| i.as_str().map(String::from)).collect())
        .unwrap_or_default();

    let confidence = value.get("confidence").and_then(|v| v.as_f64()).unwrap_or(0.8).clamp(0.0, 1.0);
    let notes = value.get("notes").and_then(|v| v.as_str()).unwrap_or("").to_string();

    Ok(FraudStageOutput { fraud_score, risk_level, indicators, confidence, notes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_is_derived_even_if_model_claims_otherwise() {
        let value = serde_json::json!({ "fraud_score": 0.9, "risk_level": "LOW" });
        let out = parse_fraud_output(&value).unwrap();
        assert_eq!(out.risk_level, RiskLevel::High);
    }

    #[test]
    fn fraud_score_is_clamped() {
        let value = serde_json::json!({ "fraud_score": 1.7 });
        let out = parse_fraud_output(&value).unwrap();
        assert_eq!(out.fraud_score, 1.0);
    }
}

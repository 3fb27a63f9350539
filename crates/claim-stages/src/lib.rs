//! claim-stages — the four model-backed pipeline stages (C2–C4), the
//! stage executor (C5), and the model-endpoint client boundary.

pub mod executor;
pub mod extraction;
pub mod fraud;
pub mod llm;
pub mod parser;
pub mod reasoning;

pub use executor::StageExecutor;
pub use extraction::{
    aggregate_document, aggregate_image, document_schema, image_schema, DocumentStage, ExtractionInput, ImageStage,
    Stage,
};
pub use fraud::{fraud_schema, FraudInput, FraudStage};
pub use llm::{HttpLlmClient, LlmClient, MockLlmClient, PromptPart};
pub use reasoning::{reasoning_schema, rule_based_reasoning, ReasoningInput, ReasoningStage};

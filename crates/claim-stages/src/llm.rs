//! The model-endpoint boundary every stage calls through.
//!
//! Grounded on `chronx_wallet::rpc_client::WalletRpcClient`: a thin reqwest
//! wrapper with one `call`-shaped method and no retry logic of its own —
//! retry, if any, lives one layer up.

use async_trait::async_trait;
use claim_core::ClaimError;

/// One piece of a prompt sent to the model.
#[derive(Clone, Debug)]
pub enum PromptPart {
    Text(String),
    Attachment { mime_type: String, bytes: Vec<u8> },
}

impl PromptPart {
    pub fn text(s: impl Into<String>) -> Self {
        PromptPart::Text(s.into())
    }
}

/// The external "model endpoint" boundary (§6). Implementations never
/// retry internally — the stage executor owns the single-shot contract.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn analyze(&self, model: &str, prompt_parts: &[PromptPart]) -> Result<String, ClaimError>;
}

/// Deterministic client for tests: returns a canned response per model name,
/// or errors if asked for one it doesn't know.
pub struct MockLlmClient {
    responses: std::collections::HashMap<String, String>,
    unavailable: bool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: std::collections::HashMap::new(),
            unavailable: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            responses: std::collections::HashMap::new(),
            unavailable: true,
        }
    }

    pub fn with_response(mut self, model: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(model.into(), response.into());
        self
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn analyze(&self, model: &str, _prompt_parts: &[PromptPart]) -> Result<String, ClaimError> {
        if self.unavailable {
            return Err(ClaimError::StageTransient {
                stage: model.to_string(),
                detail: "model endpoint unavailable".to_string(),
            });
        }
        self.responses
            .get(model)
            .cloned()
            .ok_or_else(|| ClaimError::StageFatal {
                stage: model.to_string(),
                detail: "no mock response registered".to_string(),
            })
    }
}

/// Generic "POST prompt, read a text field back" HTTP adapter. The exact
/// request/response shape is endpoint-specific, so the body format is
/// deliberately minimal and the text field name configurable.
pub struct HttpLlmClient {
    endpoint: String,
    text_field: String,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            text_field: "text".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_text_field(mut self, field: impl Into<String>) -> Self {
        self.text_field = field.into();
        self
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn analyze(&self, model: &str, prompt_parts: &[PromptPart]) -> Result<String, ClaimError> {
        let parts: Vec<serde_json::Value> = prompt_parts
            .iter()
            .map(|p| match p {
                PromptPart::Text(t) => serde_json::json!({ "type": "text", "text": t }),
                PromptPart::Attachment { mime_type, bytes } => serde_json::json!({
                    "type": "attachment",
                    "mime_type": mime_type,
                    "bytes_b64": base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes),
                }),
            })
            .collect();

        let body = serde_json::json!({ "model": model, "parts": parts });

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClaimError::StageTransient {
                stage: model.to_string(),
                detail: format!("connecting to model endpoint: {e}"),
            })?;

        let json: serde_json::Value = resp.json().await.map_err(|e| ClaimError::StageTransient {
            stage: model.to_string(),
            detail: format!("parsing model response: {e}"),
        })?;

        json.get(&self.text_field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ClaimError::StageFatal {
                stage: model.to_string(),
                detail: format!("response missing '{}' field", self.text_field),
            })
    }
}

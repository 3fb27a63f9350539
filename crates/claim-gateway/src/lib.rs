//! claim-gateway — C10 Paid-Call Gateway: outbound calls to verifier
//! endpoints that may answer with a pay-required signal, plus the
//! incoming-side receipt check for when this process is itself a verifier.
//!
//! Grounded on `original_source`'s `x402_client.py::call_with_payment`
//! (probe, pay on 402, retry once with the receipt header) and on
//! `chronx_wallet::rpc_client`'s reqwest call pattern.

pub mod receipt;

use claim_core::{Amount, AuditSink, ClaimError, ClaimId, PaidCallReceipt, VerifierKind};
pub use receipt::{encode_receipt, verify_receipt};

/// A pay-required signal extracted from a 402 response (§6).
#[derive(Clone, Debug)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub payment_id: String,
    pub description: String,
}

/// Something that can settle a `PaymentRequest` and hand back a usable
/// receipt token. In production this wraps a payment-gateway client; in
/// tests it's typically a deterministic stub.
#[async_trait::async_trait]
pub trait PaymentSettler: Send + Sync {
    async fn pay(&self, request: &PaymentRequest) -> Result<String, ClaimError>;
}

pub struct VerifierClient<P> {
    client: reqwest::Client,
    settler: P,
}

impl<P: PaymentSettler> VerifierClient<P> {
    pub fn new(settler: P) -> Self {
        Self { client: reqwest::Client::new(), settler }
    }

    /// POST to `url`, handle a 402 once, persist the receipt, retry once.
    /// §4.10 steps 1–5.
    pub async fn call<S: AuditSink>(
        &self,
        sink: &S,
        url: &str,
        body: &serde_json::Value,
        claim_id: ClaimId,
        verifier_kind: VerifierKind,
        timestamp: i64,
    ) -> Result<serde_json::Value, ClaimError> {
        let resp = self.post(url, body, None).await?;

        if resp.status() != reqwest::StatusCode::PAYMENT_REQUIRED {
            return parse_body(resp).await;
        }

        let request = extract_payment_request(resp).await?;
        let token = self.settler.pay(&request).await?;

        let receipt = PaidCallReceipt::new(claim_id, verifier_kind, request.amount, request.payment_id.clone(), token.clone(), timestamp);
        sink.append_receipt(receipt).await?;

        let retry = self.post(url, body, Some(&token)).await?;
        if retry.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            return Err(ClaimError::PaymentRequired);
        }

        parse_body(retry).await
    }

    async fn post(&self, url: &str, body: &serde_json::Value, receipt_token: Option<&str>) -> Result<reqwest::Response, ClaimError> {
        let mut req = self.client.post(url).json(body);
        if let Some(token) = receipt_token {
            req = req.header("X-Payment-Receipt", token);
        }
        req.send().await.map_err(|e| ClaimError::StageTransient {
            stage: "verifier_call".to_string(),
            detail: format!("calling {url}: {e}"),
        })
    }
}

async fn extract_payment_request(resp: reqwest::Response) -> Result<PaymentRequest, ClaimError> {
    let amount_header = resp.headers().get("X-Payment-Amount").and_then(|v| v.to_str().ok()).map(String::from);
    let payment_id_header = resp.headers().get("X-Gateway-Payment-Id").and_then(|v| v.to_str().ok()).map(String::from);
    let description_header = resp.headers().get("X-Payment-Description").and_then(|v| v.to_str().ok()).map(String::from);

    let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);

    let amount_str = amount_header.or_else(|| body.get("amount").and_then(|v| v.as_str()).map(String::from)).unwrap_or_else(|| "0".to_string());
    let amount: Amount = amount_str.parse().map_err(|_| ClaimError::StageFatal {
        stage: "verifier_call".to_string(),
        detail: format!("unparseable payment amount '{amount_str}'"),
    })?;

    let payment_id = payment_id_header
        .or_else(|| body.get("gateway_payment_id").and_then(|v| v.as_str()).map(String::from))
        .ok_or_else(|| ClaimError::StageFatal { stage: "verifier_call".to_string(), detail: "402 missing payment id".to_string() })?;

    let description = description_header
        .or_else(|| body.get("description").and_then(|v| v.as_str()).map(String::from))
        .unwrap_or_else(|| "x402 payment".to_string());

    Ok(PaymentRequest { amount, payment_id, description })
}

async fn parse_body(resp: reqwest::Response) -> Result<serde_json::Value, ClaimError> {
    if !resp.status().is_success() {
        return Err(ClaimError::StageTransient {
            stage: "verifier_call".to_string(),
            detail: format!("verifier returned {}", resp.status()),
        });
    }
    resp.json().await.map_err(|e| ClaimError::StageFatal {
        stage: "verifier_call".to_string(),
        detail: format!("parsing verifier response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSettler {
        token: String,
    }

    #[async_trait::async_trait]
    impl PaymentSettler for FixedSettler {
        async fn pay(&self, _request: &PaymentRequest) -> Result<String, ClaimError> {
            Ok(self.token.clone())
        }
    }

    #[test]
    fn payment_request_amount_parses_from_string() {
        let request = PaymentRequest { amount: "0.05".parse().unwrap(), payment_id: "p1".to_string(), description: "d".to_string() };
        assert_eq!(request.amount, Amount::new(5, 2));
    }

    #[tokio::test]
    async fn settler_returns_configured_token() {
        let settler = FixedSettler { token: "tok".to_string() };
        let request = PaymentRequest { amount: Amount::new(5, 2), payment_id: "p1".to_string(), description: "d".to_string() };
        assert_eq!(settler.pay(&request).await.unwrap(), "tok");
    }
}

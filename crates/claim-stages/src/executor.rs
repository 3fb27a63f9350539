//! C5 Stage Executor (§4.5): the six ordered steps around every stage call,
//! wired through the `AuditSink` so progress queries see results as soon
//! as they land.

use std::time::Duration;

use claim_core::{AuditSink, ClaimError, ClaimId, LogEntry, LogLevel, StageTag};
use claim_schema::FieldSchema;

/// Repair a confidence value that is out of `[0, 1]` or absent, per the
/// §4.1/§4.5 repair policy: clamp when present, default to 0.0 when not a
/// number at all.
pub fn repair_confidence(value: Option<f64>) -> (f64, bool) {
    match value {
        Some(v) if (0.0..=1.0).contains(&v) => (v, false),
        Some(v) => (v.clamp(0.0, 1.0), true),
        None => (0.0, true),
    }
}

pub struct StageExecutor<S> {
    sink: std::sync::Arc<S>,
    stage_timeout: Duration,
}

impl<S: AuditSink + 'static> StageExecutor<S> {
    pub fn new(sink: std::sync::Arc<S>, stage_timeout: Duration) -> Self {
        Self { sink, stage_timeout }
    }

    /// Run one stage call to completion, applying the six-step contract.
    /// `call` performs the actual model/tool invocation; `fallback` builds
    /// the stage's documented degraded payload.
    pub async fn run<F, Fut, O>(
        &self,
        claim_id: ClaimId,
        stage: StageTag,
        schema: &FieldSchema,
        now: impl Fn() -> i64,
        call: F,
        fallback: impl FnOnce(&str) -> O,
    ) -> Result<O, ClaimError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<O, ClaimError>>,
        O: claim_core::StageOutput + Clone + serde::Serialize,
        O: Into<claim_core::StageResultPayload>,
    {
        self.log(claim_id, stage, LogLevel::Info, format!("starting {stage}"), now()).await;

        let outcome = tokio::time::timeout(self.stage_timeout, call()).await;

        let output = match outcome {
            Ok(Ok(mut output)) => {
                let value = serde_json::to_value(&output).unwrap_or(serde_json::Value::Null);
                let (_ok, schema_errors) = claim_schema::validate(&value, schema);
                if !schema_errors.is_empty() {
                    let detail = schema_errors
                        .iter()
                        .take(3)
                        .map(|e| format!("{}: {}", e.path, e.detail))
                        .collect::<Vec<_>>()
                        .join("; ");
                    self.log(claim_id, stage, LogLevel::Warning, format!("{stage}: repaired: {detail}"), now())
                        .await;
                }

                let (confidence, repaired) = repair_confidence(Some(output.confidence()));
                if repaired {
                    output.set_confidence(confidence);
                }
                output
            }
            Ok(Err(e)) => {
                self.log(
                    claim_id,
                    stage,
                    LogLevel::Error,
                    format!("{stage} failed: {}", first_line(&e.to_string())),
                    now(),
                )
                .await;
                fallback(&e.to_string())
            }
            Err(_elapsed) => {
                self.log(
                    claim_id,
                    stage,
                    LogLevel::Error,
                    format!("{stage} failed: deadline exceeded"),
                    now(),
                )
                .await;
                fallback("deadline exceeded")
            }
        };

        let confidence = output.confidence();
        let result = claim_core::StageResult::new(claim_id, output.clone().into(), now());
        self.sink.append_stage_result(result).await?;

        self.log(
            claim_id,
            stage,
            LogLevel::Info,
            format!("{stage} completed, confidence={confidence:.2}"),
            now(),
        )
        .await;

        Ok(output)
    }

    async fn log(&self, claim_id: ClaimId, stage: StageTag, level: LogLevel, message: impl Into<String>, now: i64) {
        let entry = LogEntry::new(claim_id, stage, level, message, now);
        // Logging failures never fail the pipeline; best-effort persist
        // plus a `tracing` event so operators still see it if the sink is down.
        if self.sink.append_log_entry(entry.clone()).await.is_err() {
            tracing::warn!(claim_id = %claim_id, "failed to persist log entry: {}", entry.message);
        }
        match entry.level {
            LogLevel::Info => tracing::info!(claim_id = %claim_id, stage = %stage, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(claim_id = %claim_id, stage = %stage, "{}", entry.message),
            LogLevel::Error => tracing::error!(claim_id = %claim_id, stage = %stage, "{}", entry.message),
        }
    }
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repair_confidence_clamps_out_of_range() {
        assert_eq!(repair_confidence(Some(1.4)), (1.0, true));
        assert_eq!(repair_confidence(Some(-0.2)), (0.0, true));
        assert_eq!(repair_confidence(Some(0.5)), (0.5, false));
        assert_eq!(repair_confidence(None), (0.0, true));
    }
}

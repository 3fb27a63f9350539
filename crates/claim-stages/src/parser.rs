//! Layered extraction of a JSON object out of whatever text a model
//! returns (§9). Each layer is strictly more permissive than the last;
//! callers fall through to the rule-based fallback when all four fail.
//!
//! Grounded on the `re.search(r'\{[^{}]*\}', text, re.DOTALL)` regex used
//! throughout `original_source`'s agents, generalized to handle nested
//! braces and fenced code blocks a single-level regex cannot.

use serde_json::Value;

/// Layer 1: the whole string parses as JSON outright.
fn try_strict(text: &str) -> Option<Value> {
    serde_json::from_str(text.trim()).ok()
}

/// Layer 2: a ```json ... ``` or ``` ... ``` fenced block.
fn try_fenced_block(text: &str) -> Option<Value> {
    let fence = "```";
    let start = text.find(fence)?;
    let after_fence = &text[start + fence.len()..];
    let after_lang = after_fence.strip_prefix("json").unwrap_or(after_fence);
    let end = after_lang.find(fence)?;
    serde_json::from_str(after_lang[..end].trim()).ok()
}

/// Layer 3: scan for the first balanced `{...}` span, honoring nested
/// braces and quoted strings (unlike a single-level bracket regex).
fn try_balanced_braces(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Layer 4: no JSON at all — a small set of keyword heuristics, mirroring
/// `_parse_text_response`'s "suspicious"/"fraud" keyword sniff. Returns a
/// JSON object carrying only what the heuristic can infer; callers merge
/// this with their own defaults for anything it leaves unset.
pub fn text_heuristics(text: &str) -> Value {
    let lower = text.to_lowercase();
    let fraud_score = if lower.contains("suspicious") || lower.contains("fraud") {
        0.5
    } else {
        0.1
    };
    serde_json::json!({
        "fraud_score": fraud_score,
        "confidence": 0.7,
        "notes": text,
    })
}

/// Run layers 1–3 and return the first object-shaped hit, or `None` if no
/// JSON object could be located at all. Layer 4 is exposed separately
/// since its result shape differs per stage.
pub fn extract_json_object(text: &str) -> Option<Value> {
    try_strict(text)
        .or_else(|| try_fenced_block(text))
        .or_else(|| try_balanced_braces(text))
        .filter(|v| v.is_object())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_parses_directly() {
        let v = extract_json_object(r#"{"fraud_score": 0.2}"#).unwrap();
        assert_eq!(v["fraud_score"], 0.2);
    }

    #[test]
    fn fenced_block_is_unwrapped() {
        let text = "Here is the result:\n```json\n{\"fraud_score\": 0.4}\n```\nThanks.";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["fraud_score"], 0.4);
    }

    #[test]
    fn balanced_braces_survive_nesting() {
        let text = "noise { \"a\": {\"b\": 1}, \"c\": \"}\" } trailing";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["a"]["b"], 1);
    }

    #[test]
    fn no_json_falls_through_to_none() {
        assert!(extract_json_object("plain prose, no braces at all").is_none());
    }

    #[test]
    fn heuristic_flags_fraud_keyword() {
        let v = text_heuristics("This claim looks suspicious to me.");
        assert_eq!(v["fraud_score"], 0.5);
    }
}

//! Receipt-token encoding for the Paid-Call Gateway (§4.10).
//!
//! Decision (SPEC_FULL.md §10.2): `base64(payment_id || 0x1f || mac)` where
//! `mac = blake3::keyed_hash(secret, payment_id.as_bytes())`, the full
//! 32-byte tag (not truncated). `0x1f` (ASCII unit separator) can't appear
//! in a `payment_id` drawn from typical gateway identifier alphabets, so it
//! cleanly delimits the two parts without needing a length prefix.

const SEPARATOR: u8 = 0x1f;

/// Derive the MAC for a given payment id under a per-deployment secret.
fn mac_for(secret: &[u8; 32], payment_id: &str) -> [u8; 32] {
    *blake3::keyed_hash(secret, payment_id.as_bytes()).as_bytes()
}

/// Produce the receipt token for a payment id, binding it to `secret`.
pub fn encode_receipt(secret: &[u8; 32], payment_id: &str) -> String {
    let mac = mac_for(secret, payment_id);
    let mut buf = Vec::with_capacity(payment_id.len() + 1 + mac.len());
    buf.extend_from_slice(payment_id.as_bytes());
    buf.push(SEPARATOR);
    buf.extend_from_slice(&mac);
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, buf)
}

/// Validate an incoming receipt token (§4.10 incoming side): decode,
/// locate the separator, and check the MAC matches the expected
/// derivation from `payment_id`.
pub fn verify_receipt(secret: &[u8; 32], payment_id: &str, token: &str) -> bool {
    let Ok(raw) = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, token) else {
        return false;
    };
    let Some(sep_pos) = raw.iter().position(|&b| b == SEPARATOR) else {
        return false;
    };
    let (id_bytes, rest) = raw.split_at(sep_pos);
    let mac_bytes = &rest[1..];
    if id_bytes != payment_id.as_bytes() || mac_bytes.len() != 32 {
        return false;
    }
    let expected = mac_for(secret, payment_id);
    constant_time_eq(&expected, mac_bytes)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_verify() {
        let secret = [7u8; 32];
        let token = encode_receipt(&secret, "pay_123");
        assert!(verify_receipt(&secret, "pay_123", &token));
    }

    #[test]
    fn rejects_wrong_secret() {
        let token = encode_receipt(&[1u8; 32], "pay_123");
        assert!(!verify_receipt(&[2u8; 32], "pay_123", &token));
    }

    #[test]
    fn rejects_mismatched_payment_id() {
        let secret = [7u8; 32];
        let token = encode_receipt(&secret, "pay_123");
        assert!(!verify_receipt(&secret, "pay_456", &token));
    }

    #[test]
    fn rejects_malformed_base64() {
        assert!(!verify_receipt(&[0u8; 32], "pay_123", "not valid base64!!"));
    }
}

//! §4.8 amount/claim-id scaling for on-chain calls.

use claim_core::{Amount, ClaimId};

/// `amount_scaled = integer(amount × 10^6)` — USDC's 6 decimals.
pub fn amount_scaled(amount: Amount) -> u128 {
    let scaled = amount * Amount::from(1_000_000u64);
    scaled.trunc().to_string().parse().unwrap_or(0)
}

/// First 8 bytes (16 hex chars) of the claim UUID, hyphens stripped,
/// interpreted as a big-endian integer — per §4.8 and
/// `blockchain.py::claim_id_to_uint256`.
pub fn claim_id_scaled(claim_id: ClaimId) -> u128 {
    let bytes = claim_id.as_bytes();
    let mut acc: u128 = 0;
    for &b in &bytes[..8] {
        acc = (acc << 8) | b as u128;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn one_dollar_scales_to_one_million() {
        assert_eq!(amount_scaled(Decimal::new(100, 2)), 1_000_000);
    }

    #[test]
    fn thirty_five_hundred_scales_correctly() {
        assert_eq!(amount_scaled(Decimal::new(350000, 2)), 3_500_000_000);
    }

    #[test]
    fn claim_id_scaled_uses_first_eight_bytes() {
        let claim_id = ClaimId::new();
        let bytes = *claim_id.as_bytes();
        let expected = bytes[..8].iter().fold(0u128, |acc, &b| (acc << 8) | b as u128);
        assert_eq!(claim_id_scaled(claim_id), expected);
    }
}

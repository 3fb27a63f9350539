use serde::{Deserialize, Serialize};

use crate::types::{ClaimId, Timestamp};

/// Gas accounting for one settlement transaction (§3).
///
/// Keyed by `tx_hash`; capture is idempotent on hash collision (§5, §8).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementGasRow {
    pub id: uuid::Uuid,
    pub claim_id: ClaimId,
    pub tx_hash: String,
    pub gas_used: u64,
    pub effective_gas_price_wei: u128,
    pub total_cost_wei: u128,
    /// Human-scale value of `total_cost_wei` (native token, 18 decimals),
    /// carried alongside the wei figure per the original gas-tracking
    /// service (see SPEC_FULL.md §9).
    pub total_cost_native: rust_decimal::Decimal,
    pub timestamp: Timestamp,
}

impl SettlementGasRow {
    pub fn new(
        claim_id: ClaimId,
        tx_hash: String,
        gas_used: u64,
        effective_gas_price_wei: u128,
        timestamp: Timestamp,
    ) -> Self {
        let total_cost_wei = gas_used as u128 * effective_gas_price_wei;
        let total_cost_native = rust_decimal::Decimal::from(total_cost_wei)
            / rust_decimal::Decimal::from(1_000_000_000_000_000_000u128);
        Self {
            id: uuid::Uuid::new_v4(),
            claim_id,
            tx_hash,
            gas_used,
            effective_gas_price_wei,
            total_cost_wei,
            total_cost_native,
            timestamp,
        }
    }
}

//! C8 Settlement Driver (§4.8): the three-step on-chain settlement
//! sequence, plus the `ChainRpc` boundary it drives.
//!
//! Grounded on `chronx_wallet::rpc_client::WalletRpcClient`'s call-and-parse
//! idiom and on `original_source`'s `blockchain.py::approve_claim` three-step
//! (USDC.approve / depositEscrow / approveClaim) sequence.

pub mod chain_rpc;
pub mod driver;
pub mod scaling;

pub use chain_rpc::{ChainRpc, JsonRpcChainClient, MockChainRpc, TransactionReceipt};
pub use driver::{SettlementDriver, SettlementOutcome};
pub use scaling::{amount_scaled, claim_id_scaled};

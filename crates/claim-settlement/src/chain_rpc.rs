//! The on-chain boundary (§6): read-only `call`/`balance`/`get_transaction_receipt`,
//! write `send_raw_transaction`/`wait_for_receipt`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use claim_core::ClaimError;

#[derive(Clone, Debug)]
pub struct TransactionReceipt {
    pub gas_used: u64,
    pub effective_gas_price_wei: u128,
    pub status: bool,
    pub block_number: u64,
}

#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn call(&self, contract: &str, function: &str, args: &[serde_json::Value]) -> Result<Vec<u8>, ClaimError>;
    async fn balance(&self, address: &str) -> Result<u128, ClaimError>;
    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, ClaimError>;
    async fn send_raw_transaction(&self, signed_bytes: &[u8]) -> Result<String, ClaimError>;
    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> Result<TransactionReceipt, ClaimError>;
}

/// In-memory ledger for tests: every `send_raw_transaction` immediately
/// "confirms" with a deterministic hash and a canned receipt.
pub struct MockChainRpc {
    escrow_balances: Mutex<HashMap<u128, u128>>,
    settled_claims: Mutex<std::collections::HashSet<u128>>,
    tx_counter: Mutex<u64>,
    gas_used: u64,
    gas_price_wei: u128,
    fail_step: Mutex<Option<String>>,
}

impl MockChainRpc {
    pub fn new() -> Self {
        Self {
            escrow_balances: Mutex::new(HashMap::new()),
            settled_claims: Mutex::new(std::collections::HashSet::new()),
            tx_counter: Mutex::new(0),
            gas_used: 45_000,
            gas_price_wei: 20_000_000_000,
            fail_step: Mutex::new(None),
        }
    }

    pub fn with_escrow_balance(self, claim_id_scaled: u128, balance: u128) -> Self {
        self.escrow_balances.lock().unwrap().insert(claim_id_scaled, balance);
        self
    }

    pub fn with_settled(self, claim_id_scaled: u128) -> Self {
        self.settled_claims.lock().unwrap().insert(claim_id_scaled);
        self
    }

    /// Force every call to fail, for exercising the ChainTransient/ChainPermanent path.
    pub fn failing(self, step: impl Into<String>) -> Self {
        *self.fail_step.lock().unwrap() = Some(step.into());
        self
    }

    pub fn escrow_balance(&self, claim_id_scaled: u128) -> u128 {
        *self.escrow_balances.lock().unwrap().get(&claim_id_scaled).unwrap_or(&0)
    }

    pub fn is_settled(&self, claim_id_scaled: u128) -> bool {
        self.settled_claims.lock().unwrap().contains(&claim_id_scaled)
    }

    fn next_hash(&self) -> String {
        let mut counter = self.tx_counter.lock().unwrap();
        *counter += 1;
        format!("0x{:064x}", *counter)
    }

    fn maybe_fail(&self, step: &str) -> Result<(), ClaimError> {
        if self.fail_step.lock().unwrap().as_deref() == Some(step) {
            return Err(ClaimError::ChainTransient { step: step.to_string(), detail: "mock forced failure".to_string() });
        }
        Ok(())
    }
}

impl Default for MockChainRpc {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainRpc for MockChainRpc {
    async fn call(&self, _contract: &str, function: &str, args: &[serde_json::Value]) -> Result<Vec<u8>, ClaimError> {
        self.maybe_fail(function)?;
        let claim_id = args.first().and_then(|v| v.as_u64()).map(|v| v as u128);
        match function {
            "isSettled" => {
                let settled = claim_id.map(|cid| self.is_settled(cid)).unwrap_or(false);
                Ok(vec![settled as u8])
            }
            "getEscrowBalance" => {
                let balance = claim_id.map(|cid| self.escrow_balance(cid)).unwrap_or(0);
                Ok(balance.to_be_bytes().to_vec())
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn balance(&self, _address: &str) -> Result<u128, ClaimError> {
        Ok(1_000_000_000)
    }

    async fn get_transaction_receipt(&self, _tx_hash: &str) -> Result<Option<TransactionReceipt>, ClaimError> {
        Ok(Some(TransactionReceipt {
            gas_used: self.gas_used,
            effective_gas_price_wei: self.gas_price_wei,
            status: true,
            block_number: 1,
        }))
    }

    async fn send_raw_transaction(&self, _signed_bytes: &[u8]) -> Result<String, ClaimError> {
        Ok(self.next_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: &str, _timeout: Duration) -> Result<TransactionReceipt, ClaimError> {
        self.get_transaction_receipt(tx_hash)
            .await?
            .ok_or_else(|| ClaimError::ChainTransient { step: "wait_for_receipt".to_string(), detail: "no receipt".to_string() })
    }
}

/// Thin reqwest-based JSON-RPC adapter, grounded on
/// `chronx_wallet::rpc_client::WalletRpcClient::call`.
pub struct JsonRpcChainClient {
    url: String,
    client: reqwest::Client,
}

impl JsonRpcChainClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), client: reqwest::Client::new() }
    }

    async fn rpc_call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, ClaimError> {
        let body = serde_json::json!({ "jsonrpc": "2.0", "method": method, "params": params, "id": 1 });

        let resp = self.client.post(&self.url).json(&body).send().await.map_err(|e| ClaimError::ChainTransient {
            step: method.to_string(),
            detail: format!("connecting to RPC: {e}"),
        })?;

        let json: serde_json::Value = resp.json().await.map_err(|e| ClaimError::ChainTransient {
            step: method.to_string(),
            detail: format!("parsing RPC response: {e}"),
        })?;

        if let Some(err) = json.get("error") {
            return Err(ClaimError::ChainPermanent { step: method.to_string(), detail: err.to_string() });
        }

        Ok(json["result"].clone())
    }
}

#[async_trait]
impl ChainRpc for JsonRpcChainClient {
    async fn call(&self, contract: &str, function: &str, args: &[serde_json::Value]) -> Result<Vec<u8>, ClaimError> {
        let result = self.rpc_call("eth_call", serde_json::json!([contract, function, args])).await?;
        let hex_str = result.as_str().unwrap_or("0x");
        hex::decode(hex_str.trim_start_matches("0x")).map_err(|e| ClaimError::ChainPermanent {
            step: "call".to_string(),
            detail: format!("decoding result: {e}"),
        })
    }

    async fn balance(&self, address: &str) -> Result<u128, ClaimError> {
        let result = self.rpc_call("eth_getBalance", serde_json::json!([address, "latest"])).await?;
        let hex_str = result.as_str().unwrap_or("0x0").trim_start_matches("0x");
        u128::from_str_radix(hex_str, 16).map_err(|e| ClaimError::ChainPermanent {
            step: "balance".to_string(),
            detail: format!("parsing balance: {e}"),
        })
    }

    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>, ClaimError> {
        let result = self.rpc_call("eth_getTransactionReceipt", serde_json::json!([tx_hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }

    async fn send_raw_transaction(&self, signed_bytes: &[u8]) -> Result<String, ClaimError> {
        let hex_tx = format!("0x{}", hex::encode(signed_bytes));
        let result = self.rpc_call("eth_sendRawTransaction", serde_json::json!([hex_tx])).await?;
        result.as_str().map(String::from).ok_or_else(|| ClaimError::ChainPermanent {
            step: "send_raw_transaction".to_string(),
            detail: "expected tx hash string".to_string(),
        })
    }

    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> Result<TransactionReceipt, ClaimError> {
        tokio::time::timeout(timeout, async {
            loop {
                if let Some(receipt) = self.get_transaction_receipt(tx_hash).await? {
                    return Ok(receipt);
                }
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
        .await
        .map_err(|_| ClaimError::ChainTransient { step: "wait_for_receipt".to_string(), detail: "timed out".to_string() })?
    }
}

fn parse_receipt(value: &serde_json::Value) -> Result<TransactionReceipt, ClaimError> {
    let field_u64 = |key: &str| -> Result<u64, ClaimError> {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .ok_or_else(|| ClaimError::ChainPermanent { step: "receipt".to_string(), detail: format!("missing {key}") })
    };
    let gas_used = field_u64("gasUsed")?;
    let block_number = field_u64("blockNumber")?;
    let effective_gas_price_wei = value
        .get("effectiveGasPrice")
        .and_then(|v| v.as_str())
        .and_then(|s| u128::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .unwrap_or(0);
    let status = value.get("status").and_then(|v| v.as_str()).map(|s| s == "0x1").unwrap_or(false);
    Ok(TransactionReceipt { gas_used, effective_gas_price_wei, status, block_number })
}

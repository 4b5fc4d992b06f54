/// JSON-RPC registry client
///
/// Writes are legacy transactions signed locally with the server key and
/// pushed with `eth_sendRawTransaction`. Nonce allocation and submission
/// hold `submit_lock` so concurrent workflows never race on a nonce; the
/// confirmation wait happens after the lock is released.
use crate::{
    address::Address,
    crypto::EthSigner,
    error::{ArcIdError, ArcIdResult, UpstreamService},
    hashing::{digest_to_hex, keccak256},
    ledger::{
        abi::{self, Decoder, Token},
        tx::LegacyTransaction,
        IdentityLedger, IdentityWrite, OnChainIdentity, TxConfirmation,
    },
};
use async_trait::async_trait;
use chrono::DateTime;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MINT_IDENTITY: &str = "mintIdentity(address,bytes32,string,uint256)";
const UPDATE_IDENTITY: &str = "updateIdentity(address,bytes32,string,uint256,bool)";
const REVOKE_IDENTITY: &str = "revokeIdentity(address)";
const IS_VERIFIED: &str = "isVerified(address)";
const GET_IDENTITY_DATA: &str = "getIdentityData(address)";

/// Headroom added on top of `eth_estimateGas`, in percent
const GAS_HEADROOM_PERCENT: u128 = 20;

/// Registry client configuration
#[derive(Debug, Clone)]
pub struct LedgerClientConfig {
    pub rpc_url: String,
    pub contract_address: String,
    /// Hex-encoded secp256k1 private key of the server signer
    pub signer_private_key: String,
    /// Resolved with `eth_chainId` when unset
    pub chain_id: Option<u64>,
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    /// Fixed gas limit; estimated per transaction when unset
    pub gas_limit: Option<u64>,
    pub timeout_secs: u64,
}

enum ReceiptState {
    Pending,
    Reverted,
    Confirmed(TxConfirmation),
}

pub struct RpcLedgerClient {
    client: reqwest::Client,
    rpc_url: String,
    contract: Address,
    signer: EthSigner,
    chain_id: u64,
    confirmations: u64,
    poll_interval: Duration,
    confirmation_timeout: Duration,
    gas_limit: Option<u64>,
    submit_lock: Mutex<()>,
    request_id: AtomicU64,
}

fn ledger_error(reason: impl Into<String>) -> ArcIdError {
    ArcIdError::upstream(UpstreamService::Ledger, reason)
}

/// Parse a JSON-RPC hex quantity such as `"0x1a"`
fn parse_quantity(value: &Value, field: &str) -> ArcIdResult<u128> {
    let raw = value
        .as_str()
        .ok_or_else(|| ledger_error(format!("{} is not a hex string", field)))?;
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|_| ledger_error(format!("{} is not a valid quantity: {}", field, raw)))
}

fn parse_u64(value: &Value, field: &str) -> ArcIdResult<u64> {
    u64::try_from(parse_quantity(value, field)?)
        .map_err(|_| ledger_error(format!("{} does not fit in 64 bits", field)))
}

fn parse_data(value: &Value) -> ArcIdResult<Vec<u8>> {
    let raw = value
        .as_str()
        .ok_or_else(|| ledger_error("eth_call returned non-string result"))?;
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw))
        .map_err(|e| ledger_error(format!("eth_call returned invalid hex: {}", e)))
}

impl RpcLedgerClient {
    /// Build the client, resolving the chain id from the node if not configured
    pub async fn connect(config: LedgerClientConfig) -> ArcIdResult<Self> {
        let contract = Address::parse(&config.contract_address).map_err(|_| {
            ArcIdError::Validation(format!(
                "Invalid registry contract address: {}",
                config.contract_address
            ))
        })?;
        let signer = EthSigner::from_hex(&config.signer_private_key)?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("arcid/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ArcIdError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let mut ledger = Self {
            client,
            rpc_url: config.rpc_url,
            contract,
            signer,
            chain_id: config.chain_id.unwrap_or_default(),
            confirmations: config.confirmations.max(1),
            poll_interval: config.poll_interval,
            confirmation_timeout: config.confirmation_timeout,
            gas_limit: config.gas_limit,
            submit_lock: Mutex::new(()),
            request_id: AtomicU64::new(1),
        };

        if config.chain_id.is_none() {
            let result = ledger.rpc_call("eth_chainId", json!([])).await?;
            ledger.chain_id = parse_u64(&result, "chainId")?;
        }

        info!(
            contract = %ledger.contract,
            signer = %ledger.signer.address(),
            chain_id = ledger.chain_id,
            "Registry client ready"
        );

        Ok(ledger)
    }

    pub fn signer_address(&self) -> &Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Send a JSON-RPC request and return the result field
    async fn rpc_call(&self, method: &str, params: Value) -> ArcIdResult<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ledger_error(format!("{} timed out", method))
                } else {
                    ledger_error(format!("{} failed: {}", method, e))
                }
            })?;

        if !resp.status().is_success() {
            return Err(ledger_error(format!("{}: HTTP {}", method, resp.status())));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| ledger_error(format!("{}: invalid JSON response: {}", method, e)))?;

        if let Some(error) = json.get("error") {
            let msg = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error");
            return Err(ledger_error(format!("{} rejected: {}", method, msg)));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| ledger_error(format!("{}: response missing 'result' field", method)))
    }

    /// Read-only contract call against the latest block
    async fn call(&self, calldata: Vec<u8>) -> ArcIdResult<Vec<u8>> {
        let result = self
            .rpc_call(
                "eth_call",
                json!([
                    {
                        "to": self.contract.as_str(),
                        "data": format!("0x{}", hex::encode(calldata)),
                    },
                    "latest"
                ]),
            )
            .await?;
        parse_data(&result)
    }

    /// Sign and submit a contract call, then wait for its confirmation
    async fn transact(&self, function: &str, calldata: Vec<u8>) -> ArcIdResult<TxConfirmation> {
        let tx_hash = {
            let _guard = self.submit_lock.lock().await;
            self.submit(function, calldata).await?
        };

        self.wait_for_confirmation(function, &tx_hash).await
    }

    async fn submit(&self, function: &str, calldata: Vec<u8>) -> ArcIdResult<String> {
        let from = self.signer.address().as_str();
        let data_hex = format!("0x{}", hex::encode(&calldata));

        let nonce = parse_quantity(
            &self
                .rpc_call("eth_getTransactionCount", json!([from, "pending"]))
                .await?,
            "nonce",
        )?;
        let gas_price = parse_quantity(&self.rpc_call("eth_gasPrice", json!([])).await?, "gasPrice")?;
        let gas_limit = match self.gas_limit {
            Some(limit) => u128::from(limit),
            None => {
                let estimate = parse_quantity(
                    &self
                        .rpc_call(
                            "eth_estimateGas",
                            json!([{ "from": from, "to": self.contract.as_str(), "data": data_hex }]),
                        )
                        .await?,
                    "gas",
                )?;
                estimate + estimate * GAS_HEADROOM_PERCENT / 100
            }
        };

        let tx = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit,
            to: self.contract.clone(),
            value: 0,
            data: calldata,
        };
        let raw = tx.sign(&self.signer, self.chain_id)?;
        let local_hash = digest_to_hex(&keccak256(&raw));

        let result = self
            .rpc_call(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(&raw))]),
            )
            .await?;

        let tx_hash = match result.as_str() {
            Some(hash) => hash.to_lowercase(),
            None => {
                warn!(function, "eth_sendRawTransaction returned non-string result, using local hash");
                local_hash
            }
        };

        debug!(function, tx_hash = %tx_hash, nonce = nonce as u64, "Transaction submitted");
        Ok(tx_hash)
    }

    /// Poll for the receipt until confirmed, reverted or timed out
    ///
    /// Poll failures are retried until the deadline since the transaction is
    /// already in flight; a timeout leaves it pending on the node.
    async fn wait_for_confirmation(&self, function: &str, tx_hash: &str) -> ArcIdResult<TxConfirmation> {
        let deadline = Instant::now() + self.confirmation_timeout;

        loop {
            match self.check_receipt(tx_hash).await {
                Ok(ReceiptState::Confirmed(confirmation)) => {
                    info!(
                        function,
                        tx_hash = %tx_hash,
                        block = confirmation.block_number,
                        "Transaction confirmed"
                    );
                    return Ok(confirmation);
                }
                Ok(ReceiptState::Reverted) => {
                    warn!(function, tx_hash = %tx_hash, "Transaction reverted");
                    return Err(ledger_error(format!("transaction {} reverted", tx_hash)));
                }
                Ok(ReceiptState::Pending) => {}
                Err(e) => {
                    warn!(function, tx_hash = %tx_hash, error = %e, "Receipt poll failed");
                }
            }

            if Instant::now() >= deadline {
                warn!(function, tx_hash = %tx_hash, "Transaction not confirmed before timeout");
                return Err(ledger_error(format!(
                    "transaction {} not confirmed within {}s",
                    tx_hash,
                    self.confirmation_timeout.as_secs()
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn check_receipt(&self, tx_hash: &str) -> ArcIdResult<ReceiptState> {
        let receipt = self
            .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;

        if receipt.is_null() {
            return Ok(ReceiptState::Pending);
        }

        let status = receipt
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("0x0");
        if status == "0x0" {
            return Ok(ReceiptState::Reverted);
        }

        let block_number = match receipt.get("blockNumber") {
            Some(b) if !b.is_null() => parse_u64(b, "blockNumber")?,
            _ => return Ok(ReceiptState::Pending),
        };

        if self.confirmations > 1 {
            let head = parse_u64(
                &self.rpc_call("eth_blockNumber", json!([])).await?,
                "blockNumber",
            )?;
            if head.saturating_sub(block_number) + 1 < self.confirmations {
                return Ok(ReceiptState::Pending);
            }
        }

        Ok(ReceiptState::Confirmed(TxConfirmation {
            tx_hash: tx_hash.to_string(),
            block_number,
        }))
    }
}

#[async_trait]
impl IdentityLedger for RpcLedgerClient {
    async fn mint_identity(&self, to: &Address, write: &IdentityWrite) -> ArcIdResult<TxConfirmation> {
        let calldata = abi::encode_call(
            MINT_IDENTITY,
            &[
                Token::Address(to.clone()),
                Token::Bytes32(write.data_hash),
                Token::String(write.metadata_uri.clone()),
                Token::Uint(u128::from(write.credit_score)),
            ],
        );
        self.transact("mintIdentity", calldata).await
    }

    async fn update_identity(
        &self,
        user: &Address,
        write: &IdentityWrite,
        verified: bool,
    ) -> ArcIdResult<TxConfirmation> {
        let calldata = abi::encode_call(
            UPDATE_IDENTITY,
            &[
                Token::Address(user.clone()),
                Token::Bytes32(write.data_hash),
                Token::String(write.metadata_uri.clone()),
                Token::Uint(u128::from(write.credit_score)),
                Token::Bool(verified),
            ],
        );
        self.transact("updateIdentity", calldata).await
    }

    async fn revoke_identity(&self, user: &Address) -> ArcIdResult<TxConfirmation> {
        let calldata = abi::encode_call(REVOKE_IDENTITY, &[Token::Address(user.clone())]);
        self.transact("revokeIdentity", calldata).await
    }

    async fn is_verified(&self, user: &Address) -> ArcIdResult<bool> {
        let data = self
            .call(abi::encode_call(IS_VERIFIED, &[Token::Address(user.clone())]))
            .await?;
        Decoder::new(&data).boolean(0)
    }

    async fn get_identity_data(&self, user: &Address) -> ArcIdResult<Option<OnChainIdentity>> {
        let data = self
            .call(abi::encode_call(GET_IDENTITY_DATA, &[Token::Address(user.clone())]))
            .await?;
        let decoder = Decoder::new(&data);

        let issued_at = decoder.uint(4)?;
        if issued_at == 0 {
            return Ok(None);
        }

        let credit_score = u16::try_from(decoder.uint(1)?)
            .map_err(|_| ledger_error("creditScore out of range"))?;
        let issued_at = i64::try_from(issued_at)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| ledger_error("issuedAt out of range"))?;

        Ok(Some(OnChainIdentity {
            verified: decoder.boolean(0)?,
            credit_score,
            data_hash: decoder.bytes32(2)?,
            metadata_uri: decoder.string(3)?,
            issued_at,
        }))
    }
}

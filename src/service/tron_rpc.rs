//! TRON (TronGrid) HTTP 客户端
//!
//! 验证路径只读：原生转账读交易本体，TRC20 读执行回执里的 Transfer 事件。
//! 归集路径由节点构建交易，本地对 txID（raw_data 的 SHA-256）做可恢复签名。

use std::time::{Duration, Instant};

use k256::ecdsa::SigningKey;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{
    domain::{derivation::tron_address_to_raw, error::DepositError},
    metrics,
};

/// keccak256("Transfer(address,address,uint256)")
pub const TRC20_TRANSFER_TOPIC: &str =
    "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const CONFIRM_POLL_INTERVAL_MS: u64 = 3_000;
const CONFIRM_TIMEOUT_SECS: u64 = 90;

/// gettransactionbyid 解析结果（原生转账验证用）
#[derive(Debug, Clone)]
pub struct TronTransaction {
    pub contract_type: String,
    pub success: bool,
    /// TransferContract 的收款方（21字节hex，41开头）
    pub to_address_hex: Option<String>,
    pub from_address_hex: Option<String>,
    pub amount_sun: Option<u64>,
}

/// gettransactioninfobyid 解析结果（TRC20 验证用）
#[derive(Debug, Clone)]
pub struct TronTransactionInfo {
    pub success: bool,
    pub logs: Vec<TronEventLog>,
}

#[derive(Debug, Clone)]
pub struct TronEventLog {
    /// 合约地址（20字节hex，无41前缀）
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

pub struct TronRpcClient {
    http: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl TronRpcClient {
    pub fn new(api_url: String, api_key: Option<String>, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            api_url,
            api_key,
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, DepositError> {
        let url = format!("{}{}", self.api_url.trim_end_matches('/'), path);
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("TRON-PRO-API-KEY", key);
        }

        let started = Instant::now();
        let result = request.send().await;
        let latency_ms = started.elapsed().as_millis();

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                metrics::observe_rpc_latency_ms(latency_ms, false);
                return Err(DepositError::External(format!(
                    "tron api {} request failed: {}",
                    path, e
                )));
            }
        };

        let payload: Value = response.json().await.map_err(|e| {
            metrics::observe_rpc_latency_ms(latency_ms, false);
            DepositError::External(format!("tron api {} bad response: {}", path, e))
        })?;

        // 节点把业务错误放在 Error 字段里（HTTP 仍是 200）
        if let Some(err) = payload.get("Error").and_then(|v| v.as_str()) {
            metrics::observe_rpc_latency_ms(latency_ms, false);
            return Err(DepositError::External(format!(
                "tron api {} error: {}",
                path, err
            )));
        }

        metrics::observe_rpc_latency_ms(latency_ms, true);
        Ok(payload)
    }

    /// 账户原生余额（sun）；账户未激活时节点返回空对象，按0处理
    pub async fn get_balance_sun(&self, address: &str) -> Result<u64, DepositError> {
        let payload = self
            .post(
                "/wallet/getaccount",
                json!({ "address": address, "visible": true }),
            )
            .await?;

        Ok(payload.get("balance").and_then(|v| v.as_u64()).unwrap_or(0))
    }

    /// TRC20 balanceOf，只读合约调用
    pub async fn get_trc20_balance(
        &self,
        owner: &str,
        contract: &str,
    ) -> Result<u128, DepositError> {
        let owner_raw = tron_address_to_raw(owner)?;
        let parameter = abi_encode_address(&owner_raw);

        let payload = self
            .post(
                "/wallet/triggerconstantcontract",
                json!({
                    "owner_address": owner,
                    "contract_address": contract,
                    "function_selector": "balanceOf(address)",
                    "parameter": parameter,
                    "visible": true,
                }),
            )
            .await?;

        let result_hex = payload
            .pointer("/constant_result/0")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DepositError::External("balanceOf: missing constant_result".into()))?;

        parse_abi_uint(result_hex)
            .ok_or_else(|| DepositError::External("balanceOf: invalid result".into()))
    }

    /// 交易本体；None 表示链上找不到
    pub async fn get_transaction(
        &self,
        txid: &str,
    ) -> Result<Option<TronTransaction>, DepositError> {
        let payload = self
            .post("/walletsolidity/gettransactionbyid", json!({ "value": txid }))
            .await?;

        if payload.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(None);
        }

        let success = payload
            .pointer("/ret/0/contractRet")
            .and_then(|v| v.as_str())
            .map(|s| s == "SUCCESS")
            .unwrap_or(false);

        let contract = payload
            .pointer("/raw_data/contract/0")
            .cloned()
            .unwrap_or(Value::Null);
        let contract_type = contract
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let value = contract.pointer("/parameter/value").cloned().unwrap_or(Value::Null);

        Ok(Some(TronTransaction {
            contract_type,
            success,
            to_address_hex: value
                .get("to_address")
                .and_then(|v| v.as_str())
                .map(|s| s.to_lowercase()),
            from_address_hex: value
                .get("owner_address")
                .and_then(|v| v.as_str())
                .map(|s| s.to_lowercase()),
            amount_sun: value.get("amount").and_then(|v| v.as_u64()),
        }))
    }

    /// 执行回执与事件日志；None 表示尚未上链
    pub async fn get_transaction_info(
        &self,
        txid: &str,
    ) -> Result<Option<TronTransactionInfo>, DepositError> {
        let payload = self
            .post("/walletsolidity/gettransactioninfobyid", json!({ "value": txid }))
            .await?;

        if payload.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(None);
        }

        // receipt.result 缺省（纯转账）按成功处理，合约调用必须是 SUCCESS
        let success = match payload.pointer("/receipt/result").and_then(|v| v.as_str()) {
            Some(r) => r == "SUCCESS",
            None => true,
        };

        let logs = payload
            .get("log")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|entry| TronEventLog {
                        address: entry
                            .get("address")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_lowercase(),
                        topics: entry
                            .get("topics")
                            .and_then(|v| v.as_array())
                            .map(|t| {
                                t.iter()
                                    .filter_map(|v| v.as_str())
                                    .map(|s| s.to_lowercase())
                                    .collect()
                            })
                            .unwrap_or_default(),
                        data: entry
                            .get("data")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_lowercase(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(TronTransactionInfo { success, logs }))
    }

    /// 由节点构建原生转账交易（未签名）
    pub async fn create_native_transfer(
        &self,
        from: &str,
        to: &str,
        amount_sun: u64,
    ) -> Result<Value, DepositError> {
        let tx = self
            .post(
                "/wallet/createtransaction",
                json!({
                    "owner_address": from,
                    "to_address": to,
                    "amount": amount_sun,
                    "visible": true,
                }),
            )
            .await?;

        if tx.get("raw_data_hex").is_none() {
            return Err(DepositError::External(
                "createtransaction: node did not return a transaction".into(),
            ));
        }
        Ok(tx)
    }

    /// 由节点构建 TRC20 transfer 交易（未签名）
    pub async fn create_trc20_transfer(
        &self,
        from: &str,
        contract: &str,
        to: &str,
        amount: u128,
        fee_limit_sun: u64,
    ) -> Result<Value, DepositError> {
        let to_raw = tron_address_to_raw(to)?;
        let parameter = format!("{}{}", abi_encode_address(&to_raw), abi_encode_uint(amount));

        let payload = self
            .post(
                "/wallet/triggersmartcontract",
                json!({
                    "owner_address": from,
                    "contract_address": contract,
                    "function_selector": "transfer(address,uint256)",
                    "parameter": parameter,
                    "fee_limit": fee_limit_sun,
                    "call_value": 0,
                    "visible": true,
                }),
            )
            .await?;

        payload
            .get("transaction")
            .cloned()
            .filter(|tx| tx.get("raw_data_hex").is_some())
            .ok_or_else(|| {
                DepositError::External(
                    "triggersmartcontract: node did not return a transaction".into(),
                )
            })
    }

    /// 本地签名：txID = SHA-256(raw_data)，签名为 r||s||v（v = recovery id + 27）
    pub fn sign_transaction(
        &self,
        mut tx: Value,
        signing_key: &SigningKey,
    ) -> Result<(Value, String), DepositError> {
        let raw_data_hex = tx
            .get("raw_data_hex")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DepositError::Sweep("transaction missing raw_data_hex".into()))?;
        let raw_data = hex::decode(raw_data_hex)
            .map_err(|e| DepositError::Sweep(format!("invalid raw_data_hex: {}", e)))?;

        let txid_bytes: [u8; 32] = Sha256::digest(&raw_data).into();
        let txid = hex::encode(txid_bytes);

        let (signature, recovery_id) = signing_key
            .sign_prehash_recoverable(&txid_bytes)
            .map_err(|e| DepositError::Sweep(format!("signing failed: {}", e)))?;

        let mut sig_bytes = Vec::with_capacity(65);
        sig_bytes.extend_from_slice(&signature.to_bytes());
        sig_bytes.push(recovery_id.to_byte() + 27);

        tx["txID"] = Value::String(txid.clone());
        tx["signature"] = json!([hex::encode(sig_bytes)]);
        Ok((tx, txid))
    }

    pub async fn broadcast_transaction(&self, tx: Value) -> Result<(), DepositError> {
        let payload = self.post("/wallet/broadcasttransaction", tx).await?;

        let ok = payload.get("result").and_then(|v| v.as_bool()).unwrap_or(false);
        if !ok {
            let code = payload.get("code").and_then(|v| v.as_str()).unwrap_or("unknown");
            let message = payload
                .get("message")
                .and_then(|v| v.as_str())
                .map(|m| hex::decode(m).ok().and_then(|b| String::from_utf8(b).ok()))
                .flatten()
                .unwrap_or_default();
            return Err(DepositError::Sweep(format!(
                "broadcast rejected: {} {}",
                code, message
            )));
        }
        Ok(())
    }

    /// 轮询执行回执直到确认或超时
    pub async fn confirm_transaction(&self, txid: &str) -> Result<(), DepositError> {
        let deadline = Instant::now() + Duration::from_secs(CONFIRM_TIMEOUT_SECS);

        loop {
            if let Some(info) = self.get_transaction_info(txid).await? {
                if info.success {
                    return Ok(());
                }
                return Err(DepositError::Sweep(format!(
                    "transaction {} reverted on chain",
                    txid
                )));
            }

            if Instant::now() >= deadline {
                return Err(DepositError::Sweep(format!(
                    "confirmation timeout for transaction {}",
                    txid
                )));
            }
            tokio::time::sleep(Duration::from_millis(CONFIRM_POLL_INTERVAL_MS)).await;
        }
    }
}

/// ABI address 参数：20字节地址（去41前缀）左填充到32字节
fn abi_encode_address(raw_address: &[u8; 21]) -> String {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&raw_address[1..]);
    hex::encode(word)
}

/// ABI uint256 参数：大端左填充到32字节
fn abi_encode_uint(value: u128) -> String {
    let mut word = [0u8; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    hex::encode(word)
}

/// 32字节ABI返回值 → u128（高位非零视为溢出）
pub fn parse_abi_uint(word_hex: &str) -> Option<u128> {
    let word_hex = word_hex.trim_start_matches("0x");
    if word_hex.is_empty() {
        return Some(0);
    }
    let bytes = hex::decode(word_hex).ok()?;
    if bytes.len() > 32 {
        return None;
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    if word[..16].iter().any(|&b| b != 0) {
        return None;
    }
    Some(u128::from_be_bytes(word[16..].try_into().ok()?))
}

/// Transfer 事件 topic 里的收款方：32字节 topic 的后20字节
pub fn recipient_from_topic(topic: &str) -> Option<String> {
    let topic = topic.trim_start_matches("0x");
    if topic.len() != 64 {
        return None;
    }
    Some(topic[24..].to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abi_encode_address() {
        let raw: [u8; 21] = {
            let mut r = [0u8; 21];
            r[0] = 0x41;
            r[1..].copy_from_slice(&[0xaa; 20]);
            r
        };
        let encoded = abi_encode_address(&raw);
        assert_eq!(encoded.len(), 64);
        assert!(encoded.starts_with(&"0".repeat(24)));
        assert!(encoded.ends_with(&"aa".repeat(20)));
    }

    #[test]
    fn test_abi_uint_roundtrip() {
        let encoded = abi_encode_uint(1_000_000);
        assert_eq!(parse_abi_uint(&encoded), Some(1_000_000));
        assert_eq!(parse_abi_uint("0x"), Some(0));
        assert_eq!(parse_abi_uint(&"ff".repeat(32)), None); // 高位非零
    }

    #[test]
    fn test_recipient_from_topic() {
        let topic = format!("{}{}", "0".repeat(24), "ab".repeat(20));
        assert_eq!(recipient_from_topic(&topic).unwrap(), "ab".repeat(20));
        assert!(recipient_from_topic("abcd").is_none());
    }

    #[test]
    fn test_sign_transaction_shape() {
        let client = TronRpcClient::new("http://localhost".into(), None, 10);
        let key = SigningKey::from_slice(&[1u8; 32]).unwrap();
        let tx = json!({ "raw_data_hex": hex::encode([7u8; 64]) });

        let (signed, txid) = client.sign_transaction(tx, &key).unwrap();
        assert_eq!(txid.len(), 64);
        assert_eq!(signed["txID"].as_str().unwrap(), txid);

        let sig_hex = signed["signature"][0].as_str().unwrap();
        assert_eq!(sig_hex.len(), 130); // 65字节
        let v = u8::from_str_radix(&sig_hex[128..], 16).unwrap();
        assert!(v == 27 || v == 28);
    }
}

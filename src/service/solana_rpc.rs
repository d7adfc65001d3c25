//! Solana JSON-RPC 客户端与 legacy 交易编码
//!
//! 验证路径只读（getTransaction），归集路径自行编码并签名 legacy 交易：
//! 原生转账走 System Program，SPL 代币走 Token Program + ATA。

use std::time::{Duration, Instant};

use base64::Engine;
use ed25519_dalek::Signer;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{domain::error::DepositError, metrics};

pub const SYSTEM_PROGRAM_ID: &str = "11111111111111111111111111111111";
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const ASSOCIATED_TOKEN_PROGRAM_ID: &str = "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL";

const CONFIRM_POLL_INTERVAL_MS: u64 = 2_000;
const CONFIRM_TIMEOUT_SECS: u64 = 60;

/// getTransaction 解析结果，验证器只依赖这些字段
#[derive(Debug, Clone)]
pub struct SolanaTransactionInfo {
    pub account_keys: Vec<String>,
    pub pre_balances: Vec<u64>,
    pub post_balances: Vec<u64>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    /// meta.err 非空表示链上执行失败
    pub failed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenBalance {
    #[serde(rename = "accountIndex")]
    pub account_index: usize,
    pub mint: String,
    pub owner: Option<String>,
    #[serde(rename = "uiTokenAmount")]
    pub ui_token_amount: UiTokenAmount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UiTokenAmount {
    /// 最小单位的十进制字符串
    pub amount: String,
    pub decimals: u32,
}

/// 持有地址的 mint 代币账户
#[derive(Debug, Clone)]
pub struct TokenAccountInfo {
    pub pubkey: String,
    pub amount: u64,
}

pub struct SolanaRpcClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: String, timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { http, rpc_url }
    }

    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, DepositError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let started = Instant::now();
        let result = self.http.post(&self.rpc_url).json(&body).send().await;
        let latency_ms = started.elapsed().as_millis();

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                metrics::observe_rpc_latency_ms(latency_ms, false);
                return Err(DepositError::External(format!(
                    "solana rpc {} request failed: {}",
                    method, e
                )));
            }
        };

        let payload: Value = response.json().await.map_err(|e| {
            metrics::observe_rpc_latency_ms(latency_ms, false);
            DepositError::External(format!("solana rpc {} bad response: {}", method, e))
        })?;

        if let Some(err) = payload.get("error") {
            metrics::observe_rpc_latency_ms(latency_ms, false);
            return Err(DepositError::External(format!(
                "solana rpc {} error: {}",
                method, err
            )));
        }

        metrics::observe_rpc_latency_ms(latency_ms, true);
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn get_latest_blockhash(&self) -> Result<[u8; 32], DepositError> {
        let result = self
            .rpc_call(
                "getLatestBlockhash",
                json!([{ "commitment": "finalized" }]),
            )
            .await?;

        let blockhash = result
            .pointer("/value/blockhash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DepositError::External("getLatestBlockhash: missing blockhash".into()))?;

        decode_pubkey(blockhash)
            .map_err(|_| DepositError::External("getLatestBlockhash: invalid blockhash".into()))
    }

    pub async fn get_balance(&self, address: &str) -> Result<u64, DepositError> {
        let result = self
            .rpc_call("getBalance", json!([address, { "commitment": "finalized" }]))
            .await?;

        result
            .pointer("/value")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| DepositError::External("getBalance: missing value".into()))
    }

    /// 查询地址持有的指定 mint 代币账户（通常是ATA，0或1个）
    pub async fn get_token_accounts_by_owner(
        &self,
        owner: &str,
        mint: &str,
    ) -> Result<Vec<TokenAccountInfo>, DepositError> {
        let result = self
            .rpc_call(
                "getTokenAccountsByOwner",
                json!([owner, { "mint": mint }, { "encoding": "jsonParsed" }]),
            )
            .await?;

        let entries = result
            .pointer("/value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut accounts = Vec::with_capacity(entries.len());
        for entry in entries {
            let pubkey = entry
                .get("pubkey")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    DepositError::External("getTokenAccountsByOwner: missing pubkey".into())
                })?;
            let amount = entry
                .pointer("/account/data/parsed/info/tokenAmount/amount")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            accounts.push(TokenAccountInfo {
                pubkey: pubkey.to_string(),
                amount,
            });
        }
        Ok(accounts)
    }

    /// 地址最近的交易签名（新到旧），批量扫描入口
    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<String>, DepositError> {
        let result = self
            .rpc_call(
                "getSignaturesForAddress",
                json!([address, { "limit": limit, "commitment": "finalized" }]),
            )
            .await?;

        Ok(result
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| {
                        entry
                            .get("signature")
                            .and_then(|v| v.as_str())
                            .map(String::from)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// 已finalized的交易详情；None 表示链上找不到
    pub async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<SolanaTransactionInfo>, DepositError> {
        let result = self
            .rpc_call(
                "getTransaction",
                json!([signature, {
                    "encoding": "json",
                    "commitment": "finalized",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        let account_keys = result
            .pointer("/transaction/message/accountKeys")
            .and_then(|v| v.as_array())
            .ok_or_else(|| DepositError::External("getTransaction: missing accountKeys".into()))?
            .iter()
            .filter_map(|k| k.as_str().map(String::from))
            .collect();

        let meta = result
            .get("meta")
            .ok_or_else(|| DepositError::External("getTransaction: missing meta".into()))?;

        let parse_u64_list = |key: &str| -> Vec<u64> {
            meta.get(key)
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_u64()).collect())
                .unwrap_or_default()
        };

        let parse_token_balances = |key: &str| -> Vec<TokenBalance> {
            meta.get(key)
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| serde_json::from_value(v.clone()).ok())
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Some(SolanaTransactionInfo {
            account_keys,
            pre_balances: parse_u64_list("preBalances"),
            post_balances: parse_u64_list("postBalances"),
            pre_token_balances: parse_token_balances("preTokenBalances"),
            post_token_balances: parse_token_balances("postTokenBalances"),
            failed: !meta
                .get("err")
                .map(|e| e.is_null())
                .unwrap_or(true),
        }))
    }

    /// 广播已签名交易（base64），返回签名
    pub async fn send_transaction(&self, tx_bytes: &[u8]) -> Result<String, DepositError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(tx_bytes);
        let result = self
            .rpc_call(
                "sendTransaction",
                json!([encoded, { "encoding": "base64", "preflightCommitment": "confirmed" }]),
            )
            .await?;

        result
            .as_str()
            .map(String::from)
            .ok_or_else(|| DepositError::External("sendTransaction: missing signature".into()))
    }

    /// 轮询签名状态直到 confirmed/finalized 或超时
    pub async fn confirm_signature(&self, signature: &str) -> Result<(), DepositError> {
        let deadline = Instant::now() + Duration::from_secs(CONFIRM_TIMEOUT_SECS);

        loop {
            let result = self
                .rpc_call(
                    "getSignatureStatuses",
                    json!([[signature], { "searchTransactionHistory": true }]),
                )
                .await?;

            if let Some(status) = result.pointer("/value/0").filter(|v| !v.is_null()) {
                if let Some(err) = status.get("err").filter(|e| !e.is_null()) {
                    return Err(DepositError::Sweep(format!(
                        "transaction {} failed on chain: {}",
                        signature, err
                    )));
                }
                let confirmation = status
                    .get("confirmationStatus")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                if confirmation == "confirmed" || confirmation == "finalized" {
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                return Err(DepositError::Sweep(format!(
                    "confirmation timeout for transaction {}",
                    signature
                )));
            }
            tokio::time::sleep(Duration::from_millis(CONFIRM_POLL_INTERVAL_MS)).await;
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// legacy 交易编码
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn decode_pubkey(address: &str) -> Result<[u8; 32], DepositError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|_| DepositError::Validation(format!("invalid base58 address: {}", address)))?;
    bytes
        .try_into()
        .map_err(|_| DepositError::Validation(format!("address is not 32 bytes: {}", address)))
}

/// compact-u16 长度前缀（shortvec编码）
fn encode_compact_u16(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

struct Instruction {
    program_id_index: u8,
    account_indices: Vec<u8>,
    data: Vec<u8>,
}

/// legacy message：header + 账户表 + blockhash + 指令表
fn encode_message(
    account_keys: &[[u8; 32]],
    num_readonly_unsigned: u8,
    recent_blockhash: &[u8; 32],
    instructions: &[Instruction],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    // 单签名者场景固定：1个必需签名，0个只读已签名账户
    out.push(1);
    out.push(0);
    out.push(num_readonly_unsigned);

    encode_compact_u16(&mut out, account_keys.len() as u16);
    for key in account_keys {
        out.extend_from_slice(key);
    }

    out.extend_from_slice(recent_blockhash);

    encode_compact_u16(&mut out, instructions.len() as u16);
    for ix in instructions {
        out.push(ix.program_id_index);
        encode_compact_u16(&mut out, ix.account_indices.len() as u16);
        out.extend_from_slice(&ix.account_indices);
        encode_compact_u16(&mut out, ix.data.len() as u16);
        out.extend_from_slice(&ix.data);
    }
    out
}

fn sign_and_serialize(signer: &ed25519_dalek::SigningKey, message: Vec<u8>) -> Vec<u8> {
    let signature = signer.sign(&message);
    let mut out = Vec::with_capacity(1 + 64 + message.len());
    encode_compact_u16(&mut out, 1);
    out.extend_from_slice(&signature.to_bytes());
    out.extend_from_slice(&message);
    out
}

/// System Program 原生转账
pub fn build_system_transfer_tx(
    signer: &ed25519_dalek::SigningKey,
    to: &str,
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Result<Vec<u8>, DepositError> {
    let from_pubkey = signer.verifying_key().to_bytes();
    let to_pubkey = decode_pubkey(to)?;
    let system_program = decode_pubkey(SYSTEM_PROGRAM_ID)?;

    // transfer 指令：u32 指令号 2 + lamports LE
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    let message = encode_message(
        &[from_pubkey, to_pubkey, system_program],
        1,
        recent_blockhash,
        &[Instruction {
            program_id_index: 2,
            account_indices: vec![0, 1],
            data,
        }],
    );

    Ok(sign_and_serialize(signer, message))
}

/// Token Program SPL 转账（source/dest 均为代币账户地址）
pub fn build_spl_transfer_tx(
    owner: &ed25519_dalek::SigningKey,
    source_token_account: &str,
    dest_token_account: &str,
    amount: u64,
    recent_blockhash: &[u8; 32],
) -> Result<Vec<u8>, DepositError> {
    let owner_pubkey = owner.verifying_key().to_bytes();
    let source = decode_pubkey(source_token_account)?;
    let dest = decode_pubkey(dest_token_account)?;
    let token_program = decode_pubkey(TOKEN_PROGRAM_ID)?;

    // Transfer 指令号 3 + amount LE
    let mut data = Vec::with_capacity(9);
    data.push(3);
    data.extend_from_slice(&amount.to_le_bytes());

    let message = encode_message(
        &[owner_pubkey, source, dest, token_program],
        1,
        recent_blockhash,
        &[Instruction {
            program_id_index: 3,
            account_indices: vec![1, 2, 0],
            data,
        }],
    );

    Ok(sign_and_serialize(owner, message))
}

/// 派生 owner 在 mint 下的关联代币账户地址（ATA）
///
/// PDA：从bump=255递减，取第一个落在曲线外的哈希
pub fn find_associated_token_address(owner: &str, mint: &str) -> Result<String, DepositError> {
    let owner_bytes = decode_pubkey(owner)?;
    let mint_bytes = decode_pubkey(mint)?;
    let token_program = decode_pubkey(TOKEN_PROGRAM_ID)?;
    let ata_program = decode_pubkey(ASSOCIATED_TOKEN_PROGRAM_ID)?;

    for bump in (0u8..=255).rev() {
        let mut hasher = Sha256::new();
        hasher.update(owner_bytes);
        hasher.update(token_program);
        hasher.update(mint_bytes);
        hasher.update([bump]);
        hasher.update(ata_program);
        hasher.update(b"ProgramDerivedAddress");
        let candidate: [u8; 32] = hasher.finalize().into();

        // 合法的PDA必须不在 ed25519 曲线上
        if ed25519_dalek::VerifyingKey::from_bytes(&candidate).is_err() {
            return Ok(bs58::encode(candidate).into_string());
        }
    }

    Err(DepositError::Verification(format!(
        "no off-curve associated token address for owner {}",
        owner
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;

    #[test]
    fn test_compact_u16_encoding() {
        let cases: [(u16, &[u8]); 5] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (16384, &[0x80, 0x80, 0x01]),
        ];
        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_compact_u16(&mut out, value);
            assert_eq!(out, expected, "value {}", value);
        }
    }

    #[test]
    fn test_decode_pubkey_roundtrip() {
        let key = decode_pubkey(TOKEN_PROGRAM_ID).unwrap();
        assert_eq!(bs58::encode(key).into_string(), TOKEN_PROGRAM_ID);
        assert!(decode_pubkey("not-base58!").is_err());
        assert!(decode_pubkey("abc").is_err());
    }

    #[test]
    fn test_system_transfer_layout() {
        let signer = ed25519_dalek::SigningKey::from_bytes(&[7u8; 32]);
        let blockhash = [9u8; 32];
        let tx = build_system_transfer_tx(
            &signer,
            SYSTEM_PROGRAM_ID, // 随便一个合法的32字节地址作为收款方
            1_234_567,
            &blockhash,
        )
        .unwrap();

        // 1字节签名计数 + 64字节签名 + message
        assert_eq!(tx[0], 1);
        let message = &tx[65..];
        // header
        assert_eq!(&message[0..3], &[1, 0, 1]);
        // 3个账户
        assert_eq!(message[3], 3);
        // 指令数据尾部：[2,0,0,0] + lamports LE
        let data_tail = &tx[tx.len() - 12..];
        assert_eq!(&data_tail[0..4], &[2, 0, 0, 0]);
        assert_eq!(u64::from_le_bytes(data_tail[4..12].try_into().unwrap()), 1_234_567);
    }

    #[test]
    fn test_spl_transfer_data() {
        let signer = ed25519_dalek::SigningKey::from_bytes(&[3u8; 32]);
        let blockhash = [1u8; 32];
        let tx = build_spl_transfer_tx(
            &signer,
            TOKEN_PROGRAM_ID,
            SYSTEM_PROGRAM_ID,
            42_000_000,
            &blockhash,
        )
        .unwrap();

        let data_tail = &tx[tx.len() - 9..];
        assert_eq!(data_tail[0], 3);
        assert_eq!(u64::from_le_bytes(data_tail[1..9].try_into().unwrap()), 42_000_000);
    }

    #[test]
    fn test_signature_verifies_over_message() {
        let signer = ed25519_dalek::SigningKey::from_bytes(&[5u8; 32]);
        let tx =
            build_system_transfer_tx(&signer, SYSTEM_PROGRAM_ID, 1, &[0u8; 32]).unwrap();

        let signature = ed25519_dalek::Signature::from_bytes(tx[1..65].try_into().unwrap());
        let message = &tx[65..];
        signer.verifying_key().verify(message, &signature).unwrap();
    }

    #[test]
    fn test_ata_is_deterministic_and_off_curve() {
        let owner = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
        let mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        let a = find_associated_token_address(owner, mint).unwrap();
        let b = find_associated_token_address(owner, mint).unwrap();
        assert_eq!(a, b);

        let bytes = decode_pubkey(&a).unwrap();
        assert!(ed25519_dalek::VerifyingKey::from_bytes(&bytes).is_err());
    }
}

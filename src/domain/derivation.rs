//! HD地址派生
//!
//! 从单个主助记词确定性派生每用户充值地址：
//! - Solana: SLIP-0010 ed25519，路径 m/44'/501'/{index}'/0'（全硬化）
//! - TRON:   BIP32 secp256k1，路径 m/44'/195'/{index}'/0'/0'
//!
//! 私钥材料只允许为签名临时物化，绝不落库、绝不打日志。

use anyhow::Context;
use bip39::{Language, Mnemonic};
use coins_bip32::path::DerivationPath;
use hmac::{Hmac, Mac};
use sha2::Sha512;
use sha3::{Digest, Keccak256};
use zeroize::Zeroizing;

use crate::domain::{chain::Blockchain, error::DepositError};

type HmacSha512 = Hmac<Sha512>;

/// TRON地址版本前缀（base58check）
const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// Solana派生出的临时密钥对
pub struct SolanaKeypair {
    pub signing_key: ed25519_dalek::SigningKey,
    pub address: String,
}

/// TRON派生出的临时密钥对
pub struct TronKeypair {
    pub signing_key: k256::ecdsa::SigningKey,
    pub address: String,
}

/// 主钱包：持有BIP39种子，按 (链, 索引) 派生地址与签名密钥
#[derive(Debug)]
pub struct HdWallet {
    seed: Zeroizing<[u8; 64]>,
}

impl HdWallet {
    /// 从助记词构建；缺失/非法助记词是配置错误，在AppState构造时即失败
    pub fn from_mnemonic(mnemonic: &str) -> Result<Self, DepositError> {
        if mnemonic.trim().is_empty() {
            return Err(DepositError::Configuration(
                "master mnemonic is not configured".into(),
            ));
        }
        let parsed = Mnemonic::parse_in(Language::English, mnemonic)
            .map_err(|e| DepositError::Configuration(format!("invalid master mnemonic: {}", e)))?;
        Ok(Self {
            seed: Zeroizing::new(parsed.to_seed("")),
        })
    }

    /// 派生地址（不暴露私钥）
    pub fn address(&self, blockchain: Blockchain, index: u32) -> Result<String, DepositError> {
        match blockchain {
            Blockchain::Solana => Ok(self.solana_keypair(index)?.address),
            Blockchain::Tron => Ok(self.tron_keypair(index)?.address),
        }
    }

    /// Solana密钥对：SLIP-0010 ed25519，m/44'/501'/{index}'/0'
    pub fn solana_keypair(&self, index: u32) -> Result<SolanaKeypair, DepositError> {
        let coin_type = Blockchain::Solana.coin_type();
        let (key, _chain_code) = slip10_derive(self.seed.as_ref(), &[44, coin_type, index, 0]);
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&key);
        let address = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();
        Ok(SolanaKeypair {
            signing_key,
            address,
        })
    }

    /// TRON密钥对：BIP32 secp256k1，m/44'/195'/{index}'/0'/0'
    /// 私钥有效性（非零且小于曲线阶）由k256在构造SigningKey时强制
    pub fn tron_keypair(&self, index: u32) -> Result<TronKeypair, DepositError> {
        use coins_bip32::prelude::*;

        let path = format!("m/44'/{}'/{}'/0'/0'", Blockchain::Tron.coin_type(), index);
        let derivation_path = path
            .parse::<DerivationPath>()
            .context("Invalid derivation path")
            .map_err(derivation_error)?;

        let master_key = XPriv::root_from_seed(self.seed.as_ref(), None)
            .context("Failed to derive master key")
            .map_err(derivation_error)?;

        let derived_key = master_key
            .derive_path(&derivation_path)
            .context("Failed to derive key")
            .map_err(derivation_error)?;

        let signing_key: &k256::ecdsa::SigningKey = derived_key.as_ref();
        let signing_key = signing_key.clone();
        let address = tron_address_from_pubkey(signing_key.verifying_key());

        Ok(TronKeypair {
            signing_key,
            address,
        })
    }
}

/// 未压缩公钥 → Keccak256 → 后20字节 → 0x41前缀 → base58check
pub fn tron_address_from_pubkey(verifying_key: &k256::ecdsa::VerifyingKey) -> String {
    let encoded = verifying_key.to_encoded_point(false);
    let hash = Keccak256::digest(&encoded.as_bytes()[1..]);
    let mut payload = [0u8; 21];
    payload[0] = TRON_ADDRESS_PREFIX;
    payload[1..].copy_from_slice(&hash[12..]);
    bs58::encode(payload).with_check().into_string()
}

/// base58check地址 → 21字节原始地址（0x41 + 20字节）
pub fn tron_address_to_raw(address: &str) -> Result<[u8; 21], DepositError> {
    let bytes = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|e| DepositError::Validation(format!("invalid TRON address: {}", e)))?;
    if bytes.len() != 21 || bytes[0] != TRON_ADDRESS_PREFIX {
        return Err(DepositError::Validation(
            "invalid TRON address payload".into(),
        ));
    }
    let mut raw = [0u8; 21];
    raw.copy_from_slice(&bytes);
    Ok(raw)
}

/// SLIP-0010 ed25519派生，路径各分量一律按硬化处理
fn slip10_derive(seed: &[u8], path: &[u32]) -> ([u8; 32], [u8; 32]) {
    let (mut key, mut chain_code) = slip10_master(seed);
    for &component in path {
        let (child_key, child_chain) = slip10_child(&key, &chain_code, component | 0x8000_0000);
        key = child_key;
        chain_code = child_chain;
    }
    (key, chain_code)
}

fn slip10_master(seed: &[u8]) -> ([u8; 32], [u8; 32]) {
    // HMAC key固定为 "ed25519 seed"，长度合法，new_from_slice不会失败
    let mut mac = HmacSha512::new_from_slice(b"ed25519 seed").expect("hmac accepts any key length");
    mac.update(seed);
    split_hmac_output(mac.finalize().into_bytes().as_slice())
}

fn slip10_child(key: &[u8; 32], chain_code: &[u8; 32], hardened_index: u32) -> ([u8; 32], [u8; 32]) {
    let mut mac = HmacSha512::new_from_slice(chain_code).expect("hmac accepts any key length");
    mac.update(&[0x00]);
    mac.update(key);
    mac.update(&hardened_index.to_be_bytes());
    split_hmac_output(mac.finalize().into_bytes().as_slice())
}

fn split_hmac_output(output: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&output[..32]);
    chain_code.copy_from_slice(&output[32..]);
    (key, chain_code)
}

fn derivation_error(e: anyhow::Error) -> DepositError {
    DepositError::Verification(format!("derivation failed: {:#}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn wallet() -> HdWallet {
        HdWallet::from_mnemonic(TEST_MNEMONIC).unwrap()
    }

    // SLIP-0010参考向量（ed25519, seed 000102030405060708090a0b0c0d0e0f）
    #[test]
    fn test_slip10_vector_master() {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let (key, chain_code) = slip10_master(&seed);
        assert_eq!(
            hex::encode(key),
            "2b4be7f19ee27bbf30c667b642d5f4aa69fd169872f8fc3059c08ebae2eb19e7"
        );
        assert_eq!(
            hex::encode(chain_code),
            "90046a93de5380a72b5e45010748567d5ea02bbf6522f979e05c0d8d8ca9fffb"
        );
        let pubkey = ed25519_dalek::SigningKey::from_bytes(&key)
            .verifying_key()
            .to_bytes();
        assert_eq!(
            hex::encode(pubkey),
            "a4b2856bfec510abab89753fac1ac0e1112364e7d250545963f135f2a33188ed"
        );
    }

    #[test]
    fn test_slip10_vector_children() {
        let seed = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();

        let (key, chain_code) = slip10_derive(&seed, &[0]);
        assert_eq!(
            hex::encode(key),
            "68e0fe46dfb67e368c75379acec591dad19df3cde26e63b93a8e704f1dade7a3"
        );
        assert_eq!(
            hex::encode(chain_code),
            "8b59aa11380b624e81507a27fedda59fea6d0b779a778918a2fd3590e16e9c69"
        );

        let (key, _) = slip10_derive(&seed, &[0, 1]);
        assert_eq!(
            hex::encode(key),
            "b1d0bad404bf35da785a64ca1ac54b2617211d2777696fbffaf208f746ae84f2"
        );

        let (key, _) = slip10_derive(&seed, &[0, 1, 2, 2, 1000000000]);
        assert_eq!(
            hex::encode(key),
            "8f94d394a8e8fd6b1bc2f3f49f5c47e385281d5c17e65324b0f62483e37e8793"
        );
    }

    #[test]
    fn test_deterministic_across_calls() {
        let w = wallet();
        for index in 0..5 {
            assert_eq!(
                w.address(Blockchain::Solana, index).unwrap(),
                w.address(Blockchain::Solana, index).unwrap()
            );
            assert_eq!(
                w.address(Blockchain::Tron, index).unwrap(),
                w.address(Blockchain::Tron, index).unwrap()
            );
        }
        // 新构造的钱包派生结果一致
        let w2 = wallet();
        assert_eq!(
            w.address(Blockchain::Solana, 3).unwrap(),
            w2.address(Blockchain::Solana, 3).unwrap()
        );
    }

    #[test]
    fn test_distinct_indices_distinct_addresses() {
        let w = wallet();
        for chain in [Blockchain::Solana, Blockchain::Tron] {
            let addrs: Vec<String> = (0..5).map(|i| w.address(chain, i).unwrap()).collect();
            for i in 0..addrs.len() {
                for j in (i + 1)..addrs.len() {
                    assert_ne!(addrs[i], addrs[j], "chain {} index {} vs {}", chain, i, j);
                }
            }
        }
    }

    #[test]
    fn test_solana_address_is_base58_pubkey() {
        let kp = wallet().solana_keypair(0).unwrap();
        let decoded = bs58::decode(&kp.address).into_vec().unwrap();
        assert_eq!(decoded.len(), 32);
        assert_eq!(decoded, kp.signing_key.verifying_key().to_bytes().to_vec());
    }

    #[test]
    fn test_tron_address_shape_and_roundtrip() {
        let kp = wallet().tron_keypair(0).unwrap();
        assert!(kp.address.starts_with('T'));
        assert_eq!(kp.address.len(), 34);
        let raw = tron_address_to_raw(&kp.address).unwrap();
        assert_eq!(raw[0], 0x41);
        // 从公钥重算得到同一地址
        assert_eq!(
            tron_address_from_pubkey(kp.signing_key.verifying_key()),
            kp.address
        );
    }

    #[test]
    fn test_invalid_mnemonic_is_configuration_error() {
        let err = HdWallet::from_mnemonic("not a valid mnemonic phrase").unwrap_err();
        assert!(matches!(err, DepositError::Configuration(_)));
        let err = HdWallet::from_mnemonic("").unwrap_err();
        assert!(matches!(err, DepositError::Configuration(_)));
    }

    #[test]
    fn test_error_never_echoes_mnemonic_words() {
        let err = HdWallet::from_mnemonic("").unwrap_err();
        let msg = format!("{}", err);
        assert!(!msg.contains("abandon"));
    }
}

//! 出口脱敏
//!
//! 助记词、种子、私钥绝不允许出现在日志、落库的错误文本或API响应里。
//! 所有对外暴露异常文本的边界（AppError响应、归集审计记录）统一走这里。

use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

/// 启动时注册的已知机密（助记词等），按全文匹配替换
static KNOWN_SECRETS: Lazy<RwLock<Vec<String>>> = Lazy::new(|| RwLock::new(Vec::new()));

/// 64位以上十六进制串：私钥/种子的典型形态
static HEX_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(0x)?[0-9a-fA-F]{64,}").expect("valid regex"));

/// 64字符以上的base58串：base58编码的密钥（地址只有32-44字符，不会被误伤）
static BASE58_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[1-9A-HJ-NP-Za-km-z]{64,}").expect("valid regex"));

/// 注册机密字符串（如主助记词），此后任何经过sanitize的文本都不会泄露它
pub fn register_secret(secret: &str) {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return;
    }
    let mut secrets = KNOWN_SECRETS.write().unwrap_or_else(|p| p.into_inner());
    if !secrets.iter().any(|s| s == trimmed) {
        secrets.push(trimmed.to_string());
    }
}

/// 脱敏一段可能包含机密的文本
pub fn sanitize_secrets(message: &str) -> String {
    let mut out = message.to_string();

    {
        let secrets = KNOWN_SECRETS.read().unwrap_or_else(|p| p.into_inner());
        for secret in secrets.iter() {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
    }

    out = HEX_KEY_RE.replace_all(&out, REDACTED).into_owned();
    out = BASE58_KEY_RE.replace_all(&out, REDACTED).into_owned();
    out
}

/// 脱敏但保留已知的非机密长串（如链上txid，长度与base58密钥重叠）。
/// 豁免串先换成不命中任何模式的占位符，脱敏后回填。
pub fn sanitize_secrets_except(message: &str, exemptions: &[&str]) -> String {
    let mut out = message.to_string();
    let mut restore = Vec::new();

    for (i, exempt) in exemptions.iter().enumerate() {
        if exempt.is_empty() || !out.contains(*exempt) {
            continue;
        }
        let placeholder = format!("\u{1}exempt:{}\u{1}", i);
        out = out.replace(*exempt, &placeholder);
        restore.push((placeholder, (*exempt).to_string()));
    }

    out = sanitize_secrets(&out);

    for (placeholder, original) in restore {
        out = out.replace(&placeholder, &original);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_hex_private_key() {
        let msg = format!("signing failed for key {}", "ab".repeat(32));
        let clean = sanitize_secrets(&msg);
        assert!(!clean.contains("abab"));
        assert!(clean.contains(REDACTED));
    }

    #[test]
    fn test_keeps_addresses_intact() {
        // Solana地址（44字符base58）与TRON地址（34字符）不应被脱敏
        let msg = "transfer to EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v failed";
        assert_eq!(sanitize_secrets(msg), msg);
        let msg = "sweep from TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t failed";
        assert_eq!(sanitize_secrets(msg), msg);
    }

    #[test]
    fn test_redacts_registered_mnemonic() {
        let mnemonic = "legal winner thank year wave sausage worth useful legal winner thank yellow";
        register_secret(mnemonic);
        let msg = format!("mnemonic parse error: {}", mnemonic);
        let clean = sanitize_secrets(&msg);
        assert!(!clean.contains("sausage"));
        assert!(clean.contains(REDACTED));
    }

    #[test]
    fn test_redacts_base58_secret_key() {
        // 87字符base58（ed25519 64字节密钥的典型编码长度）
        let fake_key: String = "3".repeat(87);
        let msg = format!("bad key {}", fake_key);
        assert!(!sanitize_secrets(&msg).contains(&fake_key));
    }

    #[test]
    fn test_exempted_txid_survives_sanitization() {
        // Solana交易签名也是87-88字符base58，确认超时的错误文本
        // 必须保留它，否则运维没法排查
        let signature: String = "5".repeat(87);
        let msg = format!("confirmation timeout for transaction {}", signature);

        assert!(!sanitize_secrets(&msg).contains(&signature));
        let kept = sanitize_secrets_except(&msg, &[signature.as_str()]);
        assert!(kept.contains(&signature));
    }

    #[test]
    fn test_exemption_does_not_disable_other_redaction() {
        let signature: String = "5".repeat(87);
        let key = "ab".repeat(32);
        let msg = format!("tx {} signed with {}", signature, key);
        let clean = sanitize_secrets_except(&msg, &[signature.as_str()]);
        assert!(clean.contains(&signature));
        assert!(!clean.contains(&key));
        assert!(clean.contains(REDACTED));
    }
}

//! 支持的区块链标识

use serde::{Deserialize, Serialize};

use crate::domain::error::DepositError;

/// 支持的链
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Blockchain {
    Solana,
    Tron,
}

impl Blockchain {
    /// 数据库/计数器中使用的规范名称
    pub fn as_str(&self) -> &'static str {
        match self {
            Blockchain::Solana => "solana",
            Blockchain::Tron => "tron",
        }
    }

    /// 原生资产符号
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Blockchain::Solana => "SOL",
            Blockchain::Tron => "TRX",
        }
    }

    /// 原生资产的最小单位小数位（lamports / sun）
    pub fn native_decimals(&self) -> u32 {
        match self {
            Blockchain::Solana => 9,
            Blockchain::Tron => 6,
        }
    }

    /// BIP44 coin type
    pub fn coin_type(&self) -> u32 {
        match self {
            Blockchain::Solana => 501,
            Blockchain::Tron => 195,
        }
    }

    pub fn parse(s: &str) -> Result<Self, DepositError> {
        match s.to_lowercase().as_str() {
            "solana" | "sol" => Ok(Blockchain::Solana),
            "tron" | "trx" => Ok(Blockchain::Tron),
            other => Err(DepositError::Validation(format!(
                "unsupported blockchain: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Blockchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Blockchain::parse("SOL").unwrap(), Blockchain::Solana);
        assert_eq!(Blockchain::parse("tron").unwrap(), Blockchain::Tron);
        assert_eq!(Blockchain::parse("trx").unwrap(), Blockchain::Tron);
        assert!(Blockchain::parse("dogecoin").is_err());
    }

    #[test]
    fn test_coin_types() {
        assert_eq!(Blockchain::Solana.coin_type(), 501);
        assert_eq!(Blockchain::Tron.coin_type(), 195);
    }
}

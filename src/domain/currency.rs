//! 币种注册表
//!
//! 记录每个可充值币种所属的链、稳定/波动属性、合约地址与小数位。
//! 稳定币 1:1 折算为 LU；波动资产按现货价折算。

use rust_decimal::Decimal;

use crate::{
    config::Config,
    domain::{chain::Blockchain, error::DepositError},
};

/// 稳定币 / 波动资产
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyKind {
    Stable,
    Volatile,
}

#[derive(Debug, Clone)]
pub struct Currency {
    /// 请求中使用的币种标识（如 "USDC"、"SOL"、"USDT-TRC20"）
    pub id: &'static str,
    /// 价格查询使用的基础符号
    pub symbol: &'static str,
    pub blockchain: Blockchain,
    pub kind: CurrencyKind,
    /// 代币合约/mint地址；None 表示原生资产
    pub contract: Option<String>,
    /// 链上最小单位的小数位
    pub decimals: u32,
}

impl Currency {
    pub fn is_native(&self) -> bool {
        self.contract.is_none()
    }

    /// 代币币种必须声明合约地址，否则是配置错误
    pub fn contract_address(&self) -> Result<&str, DepositError> {
        self.contract.as_deref().ok_or_else(|| {
            DepositError::Configuration(format!("currency {} has no contract configured", self.id))
        })
    }

    /// 链上最小单位 → UI单位
    pub fn raw_to_ui(&self, raw: u128) -> Decimal {
        Decimal::from_i128_with_scale(raw as i128, self.decimals)
    }
}

/// 启动时从配置构建，运行期只读
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    currencies: Vec<Currency>,
}

impl CurrencyRegistry {
    pub fn from_config(config: &Config) -> Result<Self, DepositError> {
        if config.solana.usdc_mint.trim().is_empty() {
            return Err(DepositError::Configuration(
                "solana.usdc_mint is not configured".into(),
            ));
        }
        if config.tron.usdt_contract.trim().is_empty() {
            return Err(DepositError::Configuration(
                "tron.usdt_contract is not configured".into(),
            ));
        }

        Ok(Self {
            currencies: vec![
                Currency {
                    id: "SOL",
                    symbol: "SOL",
                    blockchain: Blockchain::Solana,
                    kind: CurrencyKind::Volatile,
                    contract: None,
                    decimals: Blockchain::Solana.native_decimals(),
                },
                Currency {
                    id: "USDC",
                    symbol: "USDC",
                    blockchain: Blockchain::Solana,
                    kind: CurrencyKind::Stable,
                    contract: Some(config.solana.usdc_mint.clone()),
                    decimals: 6,
                },
                Currency {
                    id: "TRX",
                    symbol: "TRX",
                    blockchain: Blockchain::Tron,
                    kind: CurrencyKind::Volatile,
                    contract: None,
                    decimals: Blockchain::Tron.native_decimals(),
                },
                Currency {
                    id: "USDT",
                    symbol: "USDT",
                    blockchain: Blockchain::Tron,
                    kind: CurrencyKind::Stable,
                    contract: Some(config.tron.usdt_contract.clone()),
                    decimals: 6,
                },
            ],
        })
    }

    pub fn get(&self, id: &str) -> Option<&Currency> {
        let id_upper = id.to_uppercase();
        self.currencies.iter().find(|c| c.id == id_upper)
    }

    /// 解析币种并校验其属于请求声明的链
    pub fn resolve(&self, id: &str, blockchain: Blockchain) -> Result<&Currency, DepositError> {
        let currency = self
            .get(id)
            .ok_or_else(|| DepositError::Validation(format!("unsupported currency: {}", id)))?;
        if currency.blockchain != blockchain {
            return Err(DepositError::Validation(format!(
                "currency {} does not belong to blockchain {}",
                currency.id, blockchain
            )));
        }
        Ok(currency)
    }

    pub fn all(&self) -> &[Currency] {
        &self.currencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn registry() -> CurrencyRegistry {
        CurrencyRegistry::from_config(&Config::from_env().unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_chain_mismatch() {
        let reg = registry();
        assert!(reg.resolve("USDC", Blockchain::Solana).is_ok());
        let err = reg.resolve("USDC", Blockchain::Tron).unwrap_err();
        assert!(matches!(err, DepositError::Validation(_)));
    }

    #[test]
    fn test_native_has_no_contract() {
        let reg = registry();
        let sol = reg.get("SOL").unwrap();
        assert!(sol.is_native());
        assert!(matches!(
            sol.contract_address(),
            Err(DepositError::Configuration(_))
        ));
        let usdt = reg.get("USDT").unwrap();
        assert_eq!(
            usdt.contract_address().unwrap(),
            "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"
        );
    }

    #[test]
    fn test_raw_to_ui() {
        let reg = registry();
        let usdc = reg.get("USDC").unwrap();
        // 100 USDC = 100_000_000 最小单位
        assert_eq!(usdc.raw_to_ui(100_000_000).to_string(), "100.000000");
        let sol = reg.get("SOL").unwrap();
        assert_eq!(sol.raw_to_ui(1_500_000_000).to_string(), "1.500000000");
    }
}

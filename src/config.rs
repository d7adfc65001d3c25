//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 应用配置结构体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub jwt: JwtConfig,
    pub wallet: WalletConfig,
    pub solana: SolanaConfig,
    pub tron: TronConfig,
    pub deposit: DepositConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub balance_cache: BalanceCacheConfig,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
    pub enable_file_logging: bool,
    pub log_file_path: Option<String>,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub token_expiry_secs: u64,
}

/// 主钱包配置
/// 助记词是全进程只读配置，缺失/非法在启动时直接失败
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    pub master_mnemonic: String,
}

/// Solana链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    pub rpc_url: String,
    pub treasury_address: String,
    /// 归集SOL时保留的租金豁免最小余额（lamports）
    pub rent_exempt_minimum_lamports: u64,
    /// 归集时保留的手续费预留（lamports）
    pub fee_reserve_lamports: u64,
    /// 原生SOL充值开关
    pub native_deposits_enabled: bool,
    pub usdc_mint: String,
}

/// TRON链配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TronConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub treasury_address: String,
    /// 归集TRX时保留的手续费预留（sun）
    pub fee_reserve_sun: u64,
    /// TRC20归集要求源地址至少持有的TRX（sun），用于支付能量
    pub energy_reserve_sun: u64,
    /// 原生TRX充值开关（源系统明确不支持，保持为配置而非代码）
    pub native_deposits_enabled: bool,
    pub usdt_contract: String,
}

/// 充值配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositConfig {
    /// 最低入账金额（LU，2位小数）
    pub minimum_ledger_amount: String,
}

/// 现货价格源配置（交易所 ticker API）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    pub base_url: String,
    pub ttl_secs: u64,
    pub timeout_secs: u64,
}

/// 管理端余额列表缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceCacheConfig {
    pub ttl_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://postgres@localhost:5432/chipcore".into()),
            max_connections: std::env::var("DB_MAX_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            min_connections: std::env::var("DB_MIN_CONNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            acquire_timeout_secs: std::env::var("DB_ACQ_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".into()),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".into()),
            enable_file_logging: std::env::var("LOG_FILE_ENABLED")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            log_file_path: std::env::var("LOG_FILE_PATH").ok(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| {
                "default-jwt-secret-please-change-in-production-min-32-chars".to_string()
            }),
            token_expiry_secs: std::env::var("JWT_TOKEN_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            master_mnemonic: std::env::var("MASTER_MNEMONIC").unwrap_or_default(),
        }
    }
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: std::env::var("SOLANA_RPC_URL")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into()),
            treasury_address: std::env::var("SOLANA_TREASURY_ADDRESS").unwrap_or_default(),
            rent_exempt_minimum_lamports: std::env::var("SOLANA_RENT_EXEMPT_MIN_LAMPORTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(890_880),
            fee_reserve_lamports: std::env::var("SOLANA_FEE_RESERVE_LAMPORTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5_000),
            native_deposits_enabled: std::env::var("SOLANA_NATIVE_DEPOSITS")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(true),
            usdc_mint: std::env::var("SOLANA_USDC_MINT")
                .unwrap_or_else(|_| "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".into()),
        }
    }
}

impl Default for TronConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("TRON_API_URL")
                .unwrap_or_else(|_| "https://api.trongrid.io".into()),
            api_key: std::env::var("TRON_API_KEY").ok(),
            treasury_address: std::env::var("TRON_TREASURY_ADDRESS").unwrap_or_default(),
            fee_reserve_sun: std::env::var("TRON_FEE_RESERVE_SUN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_100_000),
            energy_reserve_sun: std::env::var("TRON_ENERGY_RESERVE_SUN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000_000),
            native_deposits_enabled: std::env::var("TRON_NATIVE_DEPOSITS")
                .ok()
                .map(|v| v == "1")
                .unwrap_or(false),
            usdt_contract: std::env::var("TRON_USDT_CONTRACT")
                .unwrap_or_else(|_| "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into()),
        }
    }
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            minimum_ledger_amount: std::env::var("MIN_DEPOSIT_LU")
                .unwrap_or_else(|_| "1.00".into()),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("PRICE_API_URL")
                .unwrap_or_else(|_| "https://api.binance.com".into()),
            ttl_secs: std::env::var("PRICE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            timeout_secs: std::env::var("PRICE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

impl Default for BalanceCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: std::env::var("BALANCE_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            jwt: JwtConfig::default(),
            wallet: WalletConfig::default(),
            solana: SolanaConfig::default(),
            tron: TronConfig::default(),
            deposit: DepositConfig::default(),
            price: PriceConfig::default(),
            balance_cache: BalanceCacheConfig::default(),
        })
    }

    /// 从配置文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut config = Self::from_env()?;

        if let Some(path) = path {
            if path.as_ref().exists() {
                config = Self::from_file(path)?;
            }
        }

        Ok(config)
    }

    /// 验证配置有效性
    /// 助记词/金库地址缺失属于 ConfigurationError，启动即失败
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("postgres://")
            && !self.database.url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must start with postgres:// or postgresql://");
        }

        if self.jwt.secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if self.wallet.master_mnemonic.trim().is_empty() {
            anyhow::bail!("MASTER_MNEMONIC is not configured");
        }
        let word_count = self.wallet.master_mnemonic.split_whitespace().count();
        if !matches!(word_count, 12 | 15 | 18 | 21 | 24) {
            anyhow::bail!("MASTER_MNEMONIC must contain 12/15/18/21/24 words");
        }

        if self.solana.treasury_address.trim().is_empty() {
            anyhow::bail!("SOLANA_TREASURY_ADDRESS is not configured");
        }
        if self.tron.treasury_address.trim().is_empty() {
            anyhow::bail!("TRON_TREASURY_ADDRESS is not configured");
        }

        use std::str::FromStr;
        let min = rust_decimal::Decimal::from_str(&self.deposit.minimum_ledger_amount)
            .map_err(|_| anyhow::anyhow!("MIN_DEPOSIT_LU must be a decimal number"))?;
        if min.is_sign_negative() {
            anyhow::bail!("MIN_DEPOSIT_LU must not be negative");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn test_config() -> Config {
        let mut config = Config::from_env().unwrap();
        config.jwt.secret = "test_secret_that_is_at_least_32_characters_long".into();
        config.wallet.master_mnemonic =
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about"
                .into();
        config.solana.treasury_address = "7dGbd2QZcCKcTndnHcTL8q7SMVXAkp688NTQYwrRCrar".into();
        config.tron.treasury_address = "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8".into();
        config
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.database.max_connections, 16);
        assert_eq!(config.solana.fee_reserve_lamports, 5_000);
        assert!(!config.tron.native_deposits_enabled);
        assert!(config.solana.native_deposits_enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = test_config();
        assert!(config.validate().is_ok());

        let mut bad = test_config();
        bad.wallet.master_mnemonic = "".into();
        assert!(bad.validate().is_err());

        let mut bad = test_config();
        bad.wallet.master_mnemonic = "one two three".into();
        assert!(bad.validate().is_err());

        let mut bad = test_config();
        bad.solana.treasury_address = "".into();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgres://test@localhost/test"
max_connections = 20
min_connections = 5
acquire_timeout_secs = 30
idle_timeout_secs = 600

[server]
bind_addr = "0.0.0.0:9090"

[logging]
level = "info"
format = "text"
enable_file_logging = false

[jwt]
secret = "test_secret_that_is_at_least_32_characters_long"
token_expiry_secs = 3600

[wallet]
master_mnemonic = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about"

[solana]
rpc_url = "https://api.devnet.solana.com"
treasury_address = "7dGbd2QZcCKcTndnHcTL8q7SMVXAkp688NTQYwrRCrar"
rent_exempt_minimum_lamports = 890880
fee_reserve_lamports = 5000
native_deposits_enabled = true
usdc_mint = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"

[tron]
api_url = "https://api.shasta.trongrid.io"
treasury_address = "TJRabPrwbZy45sbavfcjinPJC18kjpRTv8"
fee_reserve_sun = 1100000
energy_reserve_sun = 30000000
native_deposits_enabled = false
usdt_contract = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"

[deposit]
minimum_ledger_amount = "1.00"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.server.bind_addr, "0.0.0.0:9090");
        assert_eq!(config.tron.api_url, "https://api.shasta.trongrid.io");
        assert!(config.validate().is_ok());
    }
}

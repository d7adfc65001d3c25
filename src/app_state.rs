//! 应用状态
//!
//! 所有链客户端与服务在这里构造并注入；助记词/金库等配置问题在
//! 构造时即失败，不允许运行期才发现缺失的客户端。

use std::sync::Arc;

use crate::{
    config::Config,
    domain::{currency::CurrencyRegistry, derivation::HdWallet, error::DepositError},
    infrastructure::{db::PgPool, secret_sanitize, ttl_cache::TtlCache},
    service::{
        address_service::AddressService,
        deposit_service::DepositService,
        ledger_service::LedgerService,
        price_service::PriceService,
        solana_rpc::SolanaRpcClient,
        sweep_service::{BalanceCache, SweepService},
        tron_rpc::TronRpcClient,
    },
};

/// 链RPC统一超时（秒）
const CHAIN_RPC_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub registry: CurrencyRegistry,
    pub solana: Arc<SolanaRpcClient>,
    pub tron: Arc<TronRpcClient>,
    pub price_service: Arc<PriceService>,
    pub address_service: Arc<AddressService>,
    pub deposit_service: Arc<DepositService>,
    pub ledger_service: Arc<LedgerService>,
    pub sweep_service: Arc<SweepService>,
    pub balance_cache: Arc<BalanceCache>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Arc<Config>) -> Result<Self, DepositError> {
        // 助记词注册进脱敏器后再解析，任何后续错误文本都不会泄露它
        secret_sanitize::register_secret(&config.wallet.master_mnemonic);
        let wallet = Arc::new(HdWallet::from_mnemonic(&config.wallet.master_mnemonic)?);

        let registry = CurrencyRegistry::from_config(&config)?;

        let solana = Arc::new(SolanaRpcClient::new(
            config.solana.rpc_url.clone(),
            CHAIN_RPC_TIMEOUT_SECS,
        ));
        let tron = Arc::new(TronRpcClient::new(
            config.tron.api_url.clone(),
            config.tron.api_key.clone(),
            CHAIN_RPC_TIMEOUT_SECS,
        ));
        let price_service = Arc::new(PriceService::new(&config.price));

        let balance_cache: Arc<BalanceCache> = Arc::new(TtlCache::new(
            std::time::Duration::from_secs(config.balance_cache.ttl_secs),
        ));

        let address_service = Arc::new(AddressService::new(pool.clone(), wallet.clone()));
        let ledger_service = Arc::new(LedgerService::new(pool.clone()));
        let deposit_service = Arc::new(DepositService::new(
            pool.clone(),
            &config,
            registry.clone(),
            address_service.clone(),
            solana.clone(),
            tron.clone(),
            price_service.clone(),
        )?);
        let sweep_service = Arc::new(SweepService::new(
            pool.clone(),
            &config,
            wallet,
            registry.clone(),
            solana.clone(),
            tron.clone(),
            balance_cache.clone(),
        ));

        Ok(Self {
            pool,
            config,
            registry,
            solana,
            tron,
            price_service,
            address_service,
            deposit_service,
            ledger_service,
            sweep_service,
            balance_cache,
        })
    }
}

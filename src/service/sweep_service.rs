//! 金库归集
//!
//! 管理端把派生地址上的资产转入金库。广播前的失败不落任何记录；
//! 一旦广播，无论成败都有审计行，错误文本先脱敏再落库。
//! 同 (from, to, asset, amount) 的已确认归集与重复 txid 都按幂等成功处理。

use std::sync::Arc;

use rust_decimal::{prelude::ToPrimitive, Decimal};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    config::Config,
    domain::{
        chain::Blockchain,
        currency::{Currency, CurrencyRegistry},
        derivation::HdWallet,
        error::DepositError,
    },
    infrastructure::{db::PgPool, secret_sanitize::sanitize_secrets_except, ttl_cache::TtlCache},
    metrics,
    repository::{deposit_addresses, sweeps, sweeps::SweepRecord},
    service::{
        solana_rpc::{self, SolanaRpcClient},
        tron_rpc::TronRpcClient,
    },
};

/// 管理端余额列表缓存（归集确认后整体失效）
pub type BalanceCache = TtlCache<String, serde_json::Value>;

/// 归集来源：有DB记录的用户地址，或仅凭索引重派生
#[derive(Debug, Clone, Copy)]
pub enum SweepSource {
    User(Uuid),
    Index(u32),
}

/// 构建并签名完毕、尚未广播的交易
enum PreparedSweep {
    Solana(Vec<u8>),
    Tron {
        signed: serde_json::Value,
        txid: String,
    },
}

pub struct SweepService {
    pool: PgPool,
    wallet: Arc<HdWallet>,
    registry: CurrencyRegistry,
    solana: Arc<SolanaRpcClient>,
    tron: Arc<TronRpcClient>,
    balance_cache: Arc<BalanceCache>,
    solana_treasury: String,
    rent_exempt_minimum_lamports: u64,
    solana_fee_reserve_lamports: u64,
    tron_treasury: String,
    tron_fee_reserve_sun: u64,
    tron_energy_reserve_sun: u64,
}

impl SweepService {
    pub fn new(
        pool: PgPool,
        config: &Config,
        wallet: Arc<HdWallet>,
        registry: CurrencyRegistry,
        solana: Arc<SolanaRpcClient>,
        tron: Arc<TronRpcClient>,
        balance_cache: Arc<BalanceCache>,
    ) -> Self {
        Self {
            pool,
            wallet,
            registry,
            solana,
            tron,
            balance_cache,
            solana_treasury: config.solana.treasury_address.clone(),
            rent_exempt_minimum_lamports: config.solana.rent_exempt_minimum_lamports,
            solana_fee_reserve_lamports: config.solana.fee_reserve_lamports,
            tron_treasury: config.tron.treasury_address.clone(),
            tron_fee_reserve_sun: config.tron.fee_reserve_sun,
            tron_energy_reserve_sun: config.tron.energy_reserve_sun,
        }
    }

    /// 归集入口。amount_ui 为 None 时归集可归集上限。
    pub async fn sweep(
        &self,
        admin_id: Uuid,
        blockchain: Blockchain,
        currency_id: &str,
        source: SweepSource,
        amount_ui: Option<Decimal>,
    ) -> Result<SweepRecord, DepositError> {
        let currency = self.registry.resolve(currency_id, blockchain)?;

        let (user_id, index, from_address) = self.resolve_source(blockchain, source).await?;
        let to_address = self.treasury_address(blockchain)?;

        // 余额与预留核算，得出本次实际转移的最小单位数
        let amount_raw = match blockchain {
            Blockchain::Solana => {
                self.solana_sweep_amount(currency, &from_address, amount_ui)
                    .await?
            }
            Blockchain::Tron => {
                self.tron_sweep_amount(currency, &from_address, amount_ui)
                    .await?
            }
        };
        let amount_ui = currency.raw_to_ui(amount_raw.into());

        if let Some(existing) =
            sweeps::find_confirmed(&self.pool, &from_address, &to_address, currency.id, amount_ui)
                .await?
        {
            info!(sweep_id = %existing.id, "sweep already confirmed, returning existing record");
            return Ok(existing);
        }

        // 构建与签名在落库之前完成：广播前的失败不留痕
        let prepared = match blockchain {
            Blockchain::Solana => {
                self.prepare_solana(currency, index, &from_address, &to_address, amount_raw)
                    .await?
            }
            Blockchain::Tron => {
                self.prepare_tron(currency, index, &from_address, &to_address, amount_raw)
                    .await?
            }
        };

        // 交易已签好，从这里起无论成败都有审计行
        let record = sweeps::create_pending(
            &self.pool,
            sweeps::CreateSweepInput {
                admin_id,
                user_id,
                blockchain: blockchain.as_str().to_string(),
                derivation_index: index as i64,
                from_address: from_address.clone(),
                to_address: to_address.clone(),
                asset: currency.id.to_string(),
                amount_ui,
            },
        )
        .await?;

        match self.submit(prepared).await {
            Ok(txid) => self.finish_confirmed(record, &txid).await,
            Err((txid, e)) => {
                metrics::inc_sweep_failed();
                let exempt: Vec<&str> = txid.iter().map(String::as_str).collect();
                let sanitized = sanitize_secrets_except(&e.to_string(), &exempt);
                error!(sweep_id = %record.id, error = %sanitized, "sweep failed");
                sweeps::mark_failed(&self.pool, record.id, txid.as_deref(), &sanitized).await?;
                Err(DepositError::Sweep(sanitized))
            }
        }
    }

    /// 广播并等待确认。Err 携带可能已产生的 txid（广播后确认超时）。
    async fn submit(&self, prepared: PreparedSweep) -> Result<String, (Option<String>, DepositError)> {
        match prepared {
            PreparedSweep::Solana(tx_bytes) => {
                let txid = self
                    .solana
                    .send_transaction(&tx_bytes)
                    .await
                    .map_err(|e| (None, e))?;
                self.solana
                    .confirm_signature(&txid)
                    .await
                    .map_err(|e| (Some(txid.clone()), e))?;
                Ok(txid)
            }
            PreparedSweep::Tron { signed, txid } => {
                self.tron
                    .broadcast_transaction(signed)
                    .await
                    .map_err(|e| (None, e))?;
                self.tron
                    .confirm_transaction(&txid)
                    .await
                    .map_err(|e| (Some(txid.clone()), e))?;
                Ok(txid)
            }
        }
    }

    async fn finish_confirmed(
        &self,
        record: SweepRecord,
        txid: &str,
    ) -> Result<SweepRecord, DepositError> {
        match sweeps::mark_confirmed(&self.pool, record.id, txid).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                // 同一txid已被先前的归集记录占用：本次的行不能停留在
                // pending，标记失败后读回占用者按成功返回
                sweeps::mark_failed(
                    &self.pool,
                    record.id,
                    None,
                    "superseded by earlier sweep with the same txid",
                )
                .await?;
                if let Some(existing) = sweeps::get_by_txid(&self.pool, txid).await? {
                    return Ok(existing);
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        }

        metrics::inc_sweep_confirmed();
        self.balance_cache.clear().await;
        info!(sweep_id = %record.id, txid = %txid, "sweep confirmed");

        sweeps::get_by_txid(&self.pool, txid)
            .await?
            .ok_or_else(|| DepositError::Sweep("confirmed sweep record not readable".into()))
    }

    async fn resolve_source(
        &self,
        blockchain: Blockchain,
        source: SweepSource,
    ) -> Result<(Option<Uuid>, u32, String), DepositError> {
        match source {
            SweepSource::User(user_id) => {
                let record = deposit_addresses::get_by_user_and_chain(
                    &self.pool,
                    user_id,
                    blockchain.as_str(),
                )
                .await?
                .ok_or_else(|| {
                    DepositError::NotFound(format!(
                        "user has no {} deposit address",
                        blockchain
                    ))
                })?;
                let index = record.derivation_index as u32;
                // 重派生校验，防止表内地址被篡改后签错源
                let derived = self.wallet.address(blockchain, index)?;
                if derived != record.address {
                    return Err(DepositError::Verification(
                        "stored address does not match derivation".into(),
                    ));
                }
                Ok((Some(user_id), index, record.address))
            }
            SweepSource::Index(index) => {
                let address = self.wallet.address(blockchain, index)?;
                Ok((None, index, address))
            }
        }
    }

    fn treasury_address(&self, blockchain: Blockchain) -> Result<String, DepositError> {
        let address = match blockchain {
            Blockchain::Solana => &self.solana_treasury,
            Blockchain::Tron => &self.tron_treasury,
        };
        if address.trim().is_empty() {
            return Err(DepositError::Configuration(format!(
                "{} treasury address is not configured",
                blockchain
            )));
        }
        Ok(address.clone())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 余额与预留核算
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn solana_sweep_amount(
        &self,
        currency: &Currency,
        from_address: &str,
        amount_ui: Option<Decimal>,
    ) -> Result<u64, DepositError> {
        if currency.is_native() {
            let balance = self.solana.get_balance(from_address).await?;
            let reserve = self.rent_exempt_minimum_lamports + self.solana_fee_reserve_lamports;
            let max_sweep = balance.saturating_sub(reserve);
            if max_sweep == 0 {
                return Err(DepositError::InsufficientBalance(format!(
                    "balance {} lamports does not exceed reserve {}",
                    balance, reserve
                )));
            }
            return requested_or_max(currency, amount_ui, max_sweep as u128);
        }

        // 代币归集还要求源地址能付手续费
        let native_balance = self.solana.get_balance(from_address).await?;
        if native_balance < self.solana_fee_reserve_lamports {
            return Err(DepositError::InsufficientFee(format!(
                "source holds {} lamports, fee reserve is {}",
                native_balance, self.solana_fee_reserve_lamports
            )));
        }

        let mint = currency.contract_address()?;
        let token_balance: u128 = self
            .solana
            .get_token_accounts_by_owner(from_address, mint)
            .await?
            .iter()
            .map(|a| a.amount as u128)
            .sum();
        if token_balance == 0 {
            return Err(DepositError::InsufficientBalance(
                "source holds no tokens to sweep".into(),
            ));
        }
        requested_or_max(currency, amount_ui, token_balance)
    }

    async fn tron_sweep_amount(
        &self,
        currency: &Currency,
        from_address: &str,
        amount_ui: Option<Decimal>,
    ) -> Result<u64, DepositError> {
        let native_balance = self.tron.get_balance_sun(from_address).await?;

        if currency.is_native() {
            let max_sweep = native_balance.saturating_sub(self.tron_fee_reserve_sun);
            if max_sweep == 0 {
                return Err(DepositError::InsufficientBalance(format!(
                    "balance {} sun does not exceed fee reserve {}",
                    native_balance, self.tron_fee_reserve_sun
                )));
            }
            return requested_or_max(currency, amount_ui, max_sweep as u128);
        }

        // TRC20 归集消耗能量，源地址必须持有足够TRX
        if native_balance < self.tron_energy_reserve_sun {
            return Err(DepositError::InsufficientFee(format!(
                "insufficient energy: source holds {} sun, reserve is {}",
                native_balance, self.tron_energy_reserve_sun
            )));
        }

        let contract = currency.contract_address()?;
        let token_balance = self.tron.get_trc20_balance(from_address, contract).await?;
        if token_balance == 0 {
            return Err(DepositError::InsufficientBalance(
                "source holds no tokens to sweep".into(),
            ));
        }
        requested_or_max(currency, amount_ui, token_balance)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // 构建、签名、广播、确认
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn prepare_solana(
        &self,
        currency: &Currency,
        index: u32,
        from_address: &str,
        to_address: &str,
        amount_raw: u64,
    ) -> Result<PreparedSweep, DepositError> {
        let keypair = self.wallet.solana_keypair(index)?;
        if keypair.address != from_address {
            return Err(DepositError::Verification(
                "derived signer does not match source address".into(),
            ));
        }
        let blockhash = self.solana.get_latest_blockhash().await?;

        if currency.is_native() {
            let tx_bytes = solana_rpc::build_system_transfer_tx(
                &keypair.signing_key,
                to_address,
                amount_raw,
                &blockhash,
            )?;
            return Ok(PreparedSweep::Solana(tx_bytes));
        }

        let mint = currency.contract_address()?;
        let source_account = self
            .solana
            .get_token_accounts_by_owner(from_address, mint)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                DepositError::InsufficientBalance("source has no token account".into())
            })?;
        // 目标固定为金库的ATA；金库必须已开好该mint的账户，
        // 缺失属于部署配置问题
        let dest_ata = solana_rpc::find_associated_token_address(to_address, mint)?;
        let dest_exists = self
            .solana
            .get_token_accounts_by_owner(to_address, mint)
            .await?
            .iter()
            .any(|a| a.pubkey == dest_ata);
        if !dest_exists {
            return Err(DepositError::Configuration(format!(
                "treasury has no associated token account for mint {}",
                mint
            )));
        }

        let tx_bytes = solana_rpc::build_spl_transfer_tx(
            &keypair.signing_key,
            &source_account.pubkey,
            &dest_ata,
            amount_raw,
            &blockhash,
        )?;
        Ok(PreparedSweep::Solana(tx_bytes))
    }

    async fn prepare_tron(
        &self,
        currency: &Currency,
        index: u32,
        from_address: &str,
        to_address: &str,
        amount_raw: u64,
    ) -> Result<PreparedSweep, DepositError> {
        let keypair = self.wallet.tron_keypair(index)?;
        if keypair.address != from_address {
            return Err(DepositError::Verification(
                "derived signer does not match source address".into(),
            ));
        }

        let unsigned = if currency.is_native() {
            self.tron
                .create_native_transfer(from_address, to_address, amount_raw)
                .await?
        } else {
            self.tron
                .create_trc20_transfer(
                    from_address,
                    currency.contract_address()?,
                    to_address,
                    amount_raw as u128,
                    self.tron_energy_reserve_sun,
                )
                .await?
        };

        let (signed, txid) = self.tron.sign_transaction(unsigned, &keypair.signing_key)?;
        Ok(PreparedSweep::Tron { signed, txid })
    }
}

/// 请求金额超过上限按余额不足拒绝；未指定金额时归集上限
fn requested_or_max(
    currency: &Currency,
    amount_ui: Option<Decimal>,
    max_raw: u128,
) -> Result<u64, DepositError> {
    let raw = match amount_ui {
        None => max_raw,
        Some(ui) => {
            let raw = ui_to_raw(ui, currency.decimals)?;
            if raw > max_raw {
                return Err(DepositError::InsufficientBalance(format!(
                    "requested {} exceeds sweepable maximum {}",
                    ui,
                    currency.raw_to_ui(max_raw)
                )));
            }
            raw
        }
    };
    raw.try_into()
        .map_err(|_| DepositError::Validation("sweep amount exceeds supported range".into()))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

/// UI单位 → 最小单位，必须整除
fn ui_to_raw(amount: Decimal, decimals: u32) -> Result<u128, DepositError> {
    if amount <= Decimal::ZERO {
        return Err(DepositError::Validation(
            "sweep amount must be positive".into(),
        ));
    }
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(decimals)))
        .ok_or_else(|| DepositError::Validation("sweep amount out of range".into()))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(DepositError::Validation(format!(
            "amount {} has more than {} decimal places",
            amount, decimals
        )));
    }
    scaled
        .to_u128()
        .ok_or_else(|| DepositError::Validation("sweep amount out of range".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::currency::CurrencyKind;
    use std::str::FromStr;

    fn sol() -> Currency {
        Currency {
            id: "SOL",
            symbol: "SOL",
            blockchain: Blockchain::Solana,
            kind: CurrencyKind::Volatile,
            contract: None,
            decimals: 9,
        }
    }

    #[test]
    fn test_ui_to_raw() {
        assert_eq!(ui_to_raw(Decimal::from_str("1.5").unwrap(), 9).unwrap(), 1_500_000_000);
        assert_eq!(ui_to_raw(Decimal::from_str("0.000001").unwrap(), 6).unwrap(), 1);
        assert!(ui_to_raw(Decimal::from_str("0.0000001").unwrap(), 6).is_err());
        assert!(ui_to_raw(Decimal::ZERO, 6).is_err());
        assert!(ui_to_raw(Decimal::from_str("-1").unwrap(), 6).is_err());
    }

    #[test]
    fn test_unspecified_amount_sweeps_maximum() {
        // 余额 1 SOL，预留 890_880 + 5_000 lamports
        let balance: u64 = 1_000_000_000;
        let reserve: u64 = 890_880 + 5_000;
        let max_raw = balance.saturating_sub(reserve) as u128;
        assert_eq!(requested_or_max(&sol(), None, max_raw).unwrap(), 999_104_120);
    }

    #[test]
    fn test_requested_amount_within_maximum_accepted() {
        let currency = sol();
        let max_raw: u128 = 999_104_120;
        let requested = Decimal::from_str("0.5").unwrap();
        assert_eq!(
            requested_or_max(&currency, Some(requested), max_raw).unwrap(),
            500_000_000
        );
        // 正好等于上限也接受
        let exact = Decimal::from_str("0.999104120").unwrap();
        assert_eq!(
            requested_or_max(&currency, Some(exact), max_raw).unwrap(),
            999_104_120
        );
    }

    #[test]
    fn test_requested_amount_over_maximum_rejected() {
        let currency = sol();
        let max_raw: u128 = 999_104_120;
        let over = Decimal::from_str("0.999104121").unwrap();
        let err = requested_or_max(&currency, Some(over), max_raw).unwrap_err();
        assert!(matches!(err, DepositError::InsufficientBalance(_)));
        // 错误文本按UI单位报告上限，不泄露内部表示
        assert!(err.to_string().contains("0.999104120"));
    }
}

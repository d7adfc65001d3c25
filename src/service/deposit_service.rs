//! 充值验证与入账
//!
//! 验证算法是纯函数（链上数据 → 类型化转账结果），单笔入账端点和
//! 批量扫描共用同一条路径。入账以 txn_id 为幂等键：确认写入与账本
//! 加款在同一个数据库事务里提交，并发验证者最多一个能赢。

use std::{str::FromStr, sync::Arc};

use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    domain::{
        chain::Blockchain,
        currency::{Currency, CurrencyRegistry},
        derivation::tron_address_to_raw,
        error::DepositError,
    },
    infrastructure::db::PgPool,
    metrics,
    repository::{balances, payments, payments::Payment},
    service::{
        address_service::AddressService,
        ledger_service::LEDGER_CURRENCY,
        price_service::PriceService,
        solana_rpc::{SolanaRpcClient, SolanaTransactionInfo},
        tron_rpc::{self, TronRpcClient, TronTransactionInfo},
    },
};

const SCAN_SIGNATURE_LIMIT: usize = 20;

/// 链上转账提取结果（最小单位）
#[derive(Debug, PartialEq, Eq)]
pub struct ChainTransfer {
    pub amount_raw: u128,
    pub from_address: String,
}

/// 入账结果：流水 + 本次是否实际加款
#[derive(Debug)]
pub struct DepositOutcome {
    pub payment: Payment,
    pub credited: bool,
}

pub struct DepositService {
    pool: PgPool,
    registry: CurrencyRegistry,
    addresses: Arc<AddressService>,
    solana: Arc<SolanaRpcClient>,
    tron: Arc<TronRpcClient>,
    price: Arc<PriceService>,
    solana_native_enabled: bool,
    tron_native_enabled: bool,
    minimum_ledger_amount: Decimal,
}

impl DepositService {
    pub fn new(
        pool: PgPool,
        config: &Config,
        registry: CurrencyRegistry,
        addresses: Arc<AddressService>,
        solana: Arc<SolanaRpcClient>,
        tron: Arc<TronRpcClient>,
        price: Arc<PriceService>,
    ) -> Result<Self, DepositError> {
        let minimum_ledger_amount = Decimal::from_str(&config.deposit.minimum_ledger_amount)
            .map_err(|e| {
                DepositError::Configuration(format!("invalid minimum_ledger_amount: {}", e))
            })?;

        Ok(Self {
            pool,
            registry,
            addresses,
            solana,
            tron,
            price,
            solana_native_enabled: config.solana.native_deposits_enabled,
            tron_native_enabled: config.tron.native_deposits_enabled,
            minimum_ledger_amount,
        })
    }

    /// 验证一笔链上交易并入账（幂等）
    pub async fn verify_and_credit(
        &self,
        user_id: Uuid,
        blockchain: Blockchain,
        currency_id: &str,
        txn_id: &str,
        bonus_id: Option<Uuid>,
    ) -> Result<DepositOutcome, DepositError> {
        let txn_id = txn_id.trim();
        if txn_id.is_empty() {
            return Err(DepositError::Validation("txn_id is required".into()));
        }
        let currency = self.registry.resolve(currency_id, blockchain)?;
        self.check_native_enabled(currency)?;

        // 已确认流水直接返回，未确认的继续重新验证（自愈）
        if let Some(existing) = payments::get_by_txn_id(&self.pool, txn_id).await? {
            if existing.status == payments::STATUS_CONFIRMED {
                metrics::inc_deposit_duplicate();
                return Ok(DepositOutcome {
                    payment: existing,
                    credited: false,
                });
            }
        }

        // 地址不存在则按正常流程分配
        let deposit_address = self
            .addresses
            .get_or_create(user_id, blockchain)
            .await?
            .record;

        let transfer = match blockchain {
            Blockchain::Solana => {
                let info = self
                    .solana
                    .get_transaction(txn_id)
                    .await?
                    .ok_or_else(|| {
                        DepositError::NotFound(format!("transaction {} not found on chain", txn_id))
                    })?;
                verify_solana_transfer(&info, &deposit_address.address, currency)
            }
            Blockchain::Tron => {
                if currency.is_native() {
                    self.extract_tron_native(txn_id, &deposit_address.address)
                        .await
                } else {
                    let info = self
                        .tron
                        .get_transaction_info(txn_id)
                        .await?
                        .ok_or_else(|| {
                            DepositError::NotFound(format!(
                                "transaction {} not found on chain",
                                txn_id
                            ))
                        })?;
                    verify_tron_trc20_transfer(&info, &deposit_address.address, currency)
                }
            }
        };

        let transfer = match transfer {
            Ok(t) => t,
            Err(e) => {
                if e.is_validation_like() {
                    metrics::inc_deposit_rejected();
                }
                return Err(e);
            }
        };

        let amount_ui = currency.raw_to_ui(transfer.amount_raw);
        let price = self.price.usd_price(currency).await?;
        let ledger_amount = to_ledger_amount(amount_ui, price);

        if ledger_amount < self.minimum_ledger_amount {
            metrics::inc_deposit_rejected();
            return Err(DepositError::BelowMinimum {
                minimum: self.minimum_ledger_amount,
            });
        }

        let outcome = self
            .confirm_and_credit(
                user_id,
                currency,
                blockchain,
                txn_id,
                amount_ui,
                ledger_amount,
                &deposit_address.address,
                &transfer.from_address,
                bonus_id,
            )
            .await?;

        if outcome.credited {
            // commit后的尽力而为副作用，失败只记日志
            self.apply_deposit_bonus(&outcome.payment).await;
            self.notify_affiliate(&outcome.payment);
        }

        Ok(outcome)
    }

    /// 批量扫描自己的Solana充值地址，每个签名走同一条验证路径
    pub async fn scan_solana_deposits(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<DepositOutcome>, DepositError> {
        let deposit_address = self
            .addresses
            .get(user_id, Blockchain::Solana)
            .await?
            .ok_or_else(|| {
                DepositError::NotFound("no solana deposit address allocated".into())
            })?;

        let signatures = self
            .solana
            .get_signatures_for_address(&deposit_address.address, SCAN_SIGNATURE_LIMIT)
            .await?;

        let scan_currencies: Vec<&Currency> = self
            .registry
            .all()
            .iter()
            .filter(|c| c.blockchain == Blockchain::Solana)
            .filter(|c| !c.is_native() || self.solana_native_enabled)
            .collect();

        let mut credited = Vec::new();
        for signature in &signatures {
            // 已确认的签名跳过，避免无谓的RPC
            if let Some(existing) = payments::get_by_txn_id(&self.pool, signature).await? {
                if existing.status == payments::STATUS_CONFIRMED {
                    continue;
                }
            }

            for currency in &scan_currencies {
                match self
                    .verify_and_credit(user_id, Blockchain::Solana, currency.id, signature, None)
                    .await
                {
                    Ok(outcome) if outcome.credited => {
                        credited.push(outcome);
                        break;
                    }
                    Ok(_) => break,
                    // 扫描中验证不通过是常态（别的币种/不相关交易），继续
                    Err(e) if e.is_validation_like() => continue,
                    Err(e) => {
                        warn!(signature = %signature, error = %e, "scan verification errored");
                        continue;
                    }
                }
            }
        }

        Ok(credited)
    }

    fn check_native_enabled(&self, currency: &Currency) -> Result<(), DepositError> {
        if !currency.is_native() {
            return Ok(());
        }
        let enabled = match currency.blockchain {
            Blockchain::Solana => self.solana_native_enabled,
            Blockchain::Tron => self.tron_native_enabled,
        };
        if !enabled {
            return Err(DepositError::Validation(format!(
                "native {} deposits are not enabled",
                currency.id
            )));
        }
        Ok(())
    }

    async fn extract_tron_native(
        &self,
        txn_id: &str,
        deposit_address: &str,
    ) -> Result<ChainTransfer, DepositError> {
        let tx = self.tron.get_transaction(txn_id).await?.ok_or_else(|| {
            DepositError::NotFound(format!("transaction {} not found on chain", txn_id))
        })?;

        if !tx.success {
            return Err(DepositError::Verification(
                "transaction failed on chain".into(),
            ));
        }
        if tx.contract_type != "TransferContract" {
            return Err(DepositError::Verification(format!(
                "unexpected contract type {}",
                tx.contract_type
            )));
        }

        let expected_hex = hex::encode(tron_address_to_raw(deposit_address)?);
        let to_hex = tx
            .to_address_hex
            .ok_or_else(|| DepositError::Verification("transfer has no recipient".into()))?;
        if to_hex != expected_hex {
            return Err(DepositError::Verification(
                "recipient does not match deposit address".into(),
            ));
        }

        let amount = tx
            .amount_sun
            .filter(|&a| a > 0)
            .ok_or_else(|| DepositError::Verification("transfer amount is zero".into()))?;

        Ok(ChainTransfer {
            amount_raw: amount as u128,
            from_address: tx.from_address_hex.unwrap_or_default(),
        })
    }

    /// 确认流水 + 账本加款，同事务。输掉竞争时读回赢家流水按成功返回。
    #[allow(clippy::too_many_arguments)]
    async fn confirm_and_credit(
        &self,
        user_id: Uuid,
        currency: &Currency,
        blockchain: Blockchain,
        txn_id: &str,
        amount_ui: Decimal,
        ledger_amount: Decimal,
        deposit_address: &str,
        from_address: &str,
        bonus_id: Option<Uuid>,
    ) -> Result<DepositOutcome, DepositError> {
        let input = payments::ConfirmPaymentInput {
            txn_id: txn_id.to_string(),
            user_id,
            currency: currency.id.to_string(),
            blockchain: blockchain.as_str().to_string(),
            amount: amount_ui,
            fiat_amount: ledger_amount,
            address: deposit_address.to_string(),
            from_address: from_address.to_string(),
            bonus_id,
        };

        let mut tx = self.pool.begin().await?;
        match payments::claim_confirmation(&mut tx, &input).await? {
            Some(payment) => {
                balances::credit_in_tx(
                    &mut tx,
                    user_id,
                    LEDGER_CURRENCY,
                    ledger_amount,
                    &format!("deposit:{}", txn_id),
                )
                .await?;
                tx.commit().await?;

                metrics::inc_deposit_credited();
                info!(
                    user_id = %user_id,
                    txn_id = %txn_id,
                    currency = currency.id,
                    %ledger_amount,
                    "deposit credited"
                );
                Ok(DepositOutcome {
                    payment,
                    credited: true,
                })
            }
            None => {
                // 另一个验证者已确认，放弃本事务并读回赢家
                tx.rollback().await?;
                let winner = payments::get_by_txn_id(&self.pool, txn_id)
                    .await?
                    .ok_or_else(|| {
                        DepositError::Verification(
                            "payment confirmed concurrently but not readable".into(),
                        )
                    })?;
                metrics::inc_deposit_duplicate();
                Ok(DepositOutcome {
                    payment: winner,
                    credited: false,
                })
            }
        }
    }

    /// 充值红利钩子：流水带bonus_id时把入账金额计入红利列
    async fn apply_deposit_bonus(&self, payment: &Payment) {
        let Some(bonus_id) = payment.bonus_id else {
            return;
        };
        match balances::credit_bonus(
            &self.pool,
            payment.user_id,
            LEDGER_CURRENCY,
            payment.fiat_amount,
        )
        .await
        {
            Ok(_) => info!(
                user_id = %payment.user_id,
                bonus_id = %bonus_id,
                amount = %payment.fiat_amount,
                "deposit bonus credited"
            ),
            Err(e) => warn!(
                user_id = %payment.user_id,
                bonus_id = %bonus_id,
                error = %e,
                "deposit bonus credit failed"
            ),
        }
    }

    /// 联盟回传钩子：只记日志，外部投递由独立任务消费
    fn notify_affiliate(&self, payment: &Payment) {
        info!(
            user_id = %payment.user_id,
            txn_id = %payment.txn_id,
            amount = %payment.fiat_amount,
            "affiliate postback queued"
        );
    }
}

/// 链上金额 × 美元价 → 账本金额，账本一律记2位小数
fn to_ledger_amount(amount_ui: Decimal, usd_price: Decimal) -> Decimal {
    (amount_ui * usd_price).round_dp(2)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 纯验证函数：链上数据 → 类型化转账结果
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Solana转账提取
///
/// 原生：充值地址在账户表中的 pre/post lamports 差；
/// 代币：(owner == 充值地址 && mint == 币种mint) 的 token balance 差，
/// 以 accountIndex 对齐 pre/post。
pub fn verify_solana_transfer(
    info: &SolanaTransactionInfo,
    deposit_address: &str,
    currency: &Currency,
) -> Result<ChainTransfer, DepositError> {
    if info.failed {
        return Err(DepositError::Verification(
            "transaction failed on chain".into(),
        ));
    }

    let from_address = info.account_keys.first().cloned().unwrap_or_default();

    if currency.is_native() {
        let index = info
            .account_keys
            .iter()
            .position(|k| k == deposit_address)
            .ok_or_else(|| {
                DepositError::Verification(
                    "deposit address does not appear in transaction".into(),
                )
            })?;

        let pre = info.pre_balances.get(index).copied().unwrap_or(0);
        let post = info.post_balances.get(index).copied().ok_or_else(|| {
            DepositError::Verification("transaction metadata missing balances".into())
        })?;

        if post <= pre {
            return Err(DepositError::Verification(
                "no lamports received at deposit address".into(),
            ));
        }

        return Ok(ChainTransfer {
            amount_raw: (post - pre) as u128,
            from_address,
        });
    }

    let mint = currency.contract_address()?;

    let post = info
        .post_token_balances
        .iter()
        .find(|b| b.mint == mint && b.owner.as_deref() == Some(deposit_address))
        .ok_or_else(|| {
            DepositError::Verification("no token balance for deposit address in transaction".into())
        })?;

    let post_amount: u128 = post.ui_token_amount.amount.parse().map_err(|_| {
        DepositError::Verification("invalid token amount in transaction metadata".into())
    })?;

    // 同一代币账户在 pre 里以相同 accountIndex 出现；不存在则视为0（新开ATA）
    let pre_amount: u128 = info
        .pre_token_balances
        .iter()
        .find(|b| b.account_index == post.account_index)
        .map(|b| b.ui_token_amount.amount.parse())
        .transpose()
        .map_err(|_| {
            DepositError::Verification("invalid token amount in transaction metadata".into())
        })?
        .unwrap_or(0);

    if post_amount <= pre_amount {
        return Err(DepositError::Verification(
            "no tokens received at deposit address".into(),
        ));
    }

    // 付款方：同mint下余额减少的账户owner
    let token_sender = info
        .pre_token_balances
        .iter()
        .filter(|b| b.mint == mint && b.account_index != post.account_index)
        .find_map(|pre_b| {
            let post_b_amount = info
                .post_token_balances
                .iter()
                .find(|b| b.account_index == pre_b.account_index)
                .and_then(|b| b.ui_token_amount.amount.parse::<u128>().ok())
                .unwrap_or(0);
            let pre_b_amount = pre_b.ui_token_amount.amount.parse::<u128>().ok()?;
            if post_b_amount < pre_b_amount {
                pre_b.owner.clone()
            } else {
                None
            }
        })
        .unwrap_or(from_address);

    Ok(ChainTransfer {
        amount_raw: post_amount - pre_amount,
        from_address: token_sender,
    })
}

/// TRC20转账提取：Transfer事件里 (合约地址, topic0, topic2收款方) 全部匹配
/// 才计入，金额取 data 的 uint256。多条匹配事件金额累加。
pub fn verify_tron_trc20_transfer(
    info: &TronTransactionInfo,
    deposit_address: &str,
    currency: &Currency,
) -> Result<ChainTransfer, DepositError> {
    if !info.success {
        return Err(DepositError::Verification(
            "transaction failed on chain".into(),
        ));
    }

    let contract_raw = tron_address_to_raw(currency.contract_address()?)?;
    let contract_hex = hex::encode(&contract_raw[1..]);
    let deposit_raw = tron_address_to_raw(deposit_address)?;
    let deposit_hex = hex::encode(&deposit_raw[1..]);

    let mut total: u128 = 0;
    let mut from_address = String::new();

    for log in &info.logs {
        if log.address != contract_hex {
            continue;
        }
        let Some(topic0) = log.topics.first() else {
            continue;
        };
        if topic0.trim_start_matches("0x") != tron_rpc::TRC20_TRANSFER_TOPIC {
            continue;
        }
        let Some(recipient) = log.topics.get(2).and_then(|t| tron_rpc::recipient_from_topic(t))
        else {
            continue;
        };
        if recipient != deposit_hex {
            continue;
        }

        let amount = tron_rpc::parse_abi_uint(&log.data).ok_or_else(|| {
            DepositError::Verification("invalid transfer amount in event data".into())
        })?;
        total = total.saturating_add(amount);

        if from_address.is_empty() {
            if let Some(sender) = log.topics.get(1).and_then(|t| tron_rpc::recipient_from_topic(t))
            {
                from_address = format!("41{}", sender);
            }
        }
    }

    if total == 0 {
        return Err(DepositError::Verification(
            "no matching transfer to deposit address".into(),
        ));
    }

    Ok(ChainTransfer {
        amount_raw: total,
        from_address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::currency::CurrencyKind,
        service::{
            solana_rpc::{TokenBalance, UiTokenAmount},
            tron_rpc::{TronEventLog, TronTransactionInfo},
        },
    };

    const DEPOSIT_SOL: &str = "4Nd1mYvM6PjcJbnkaRZmwSTudcVq8tdLzPEcHzbeWdmb";
    const SENDER_SOL: &str = "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin";
    const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn sol_native() -> Currency {
        Currency {
            id: "SOL",
            symbol: "SOL",
            blockchain: Blockchain::Solana,
            kind: CurrencyKind::Volatile,
            contract: None,
            decimals: 9,
        }
    }

    fn usdc() -> Currency {
        Currency {
            id: "USDC",
            symbol: "USDC",
            blockchain: Blockchain::Solana,
            kind: CurrencyKind::Stable,
            contract: Some(USDC_MINT.into()),
            decimals: 6,
        }
    }

    fn usdt_tron() -> Currency {
        Currency {
            id: "USDT",
            symbol: "USDT",
            blockchain: Blockchain::Tron,
            kind: CurrencyKind::Stable,
            contract: Some("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t".into()),
            decimals: 6,
        }
    }

    fn token_balance(account_index: usize, mint: &str, owner: &str, amount: &str) -> TokenBalance {
        TokenBalance {
            account_index,
            mint: mint.into(),
            owner: Some(owner.into()),
            ui_token_amount: UiTokenAmount {
                amount: amount.into(),
                decimals: 6,
            },
        }
    }

    #[test]
    fn test_ledger_amount_rounds_to_two_decimals() {
        use std::str::FromStr;

        // 0.123456789 SOL × $142.50 = 17.5925924325 → 17.59
        let amount = Decimal::from_str("0.123456789").unwrap();
        let price = Decimal::from_str("142.50").unwrap();
        assert_eq!(
            to_ledger_amount(amount, price),
            Decimal::from_str("17.59").unwrap()
        );

        // 稳定币按 1:1，金额本身就是2位以内时不变
        let amount = Decimal::from_str("25.000000").unwrap();
        assert_eq!(
            to_ledger_amount(amount, Decimal::ONE),
            Decimal::from_str("25.00").unwrap()
        );

        // 进位方向：第三位是6时向上
        let amount = Decimal::from_str("1.006").unwrap();
        assert_eq!(
            to_ledger_amount(amount, Decimal::ONE),
            Decimal::from_str("1.01").unwrap()
        );
    }

    #[test]
    fn test_solana_native_delta() {
        let info = SolanaTransactionInfo {
            account_keys: vec![SENDER_SOL.into(), DEPOSIT_SOL.into()],
            pre_balances: vec![10_000_000_000, 500],
            post_balances: vec![8_999_995_000, 1_000_000_500],
            pre_token_balances: vec![],
            post_token_balances: vec![],
            failed: false,
        };
        let transfer = verify_solana_transfer(&info, DEPOSIT_SOL, &sol_native()).unwrap();
        assert_eq!(transfer.amount_raw, 1_000_000_000);
        assert_eq!(transfer.from_address, SENDER_SOL);
    }

    #[test]
    fn test_solana_native_recipient_mismatch() {
        let info = SolanaTransactionInfo {
            account_keys: vec![SENDER_SOL.into()],
            pre_balances: vec![10],
            post_balances: vec![5],
            pre_token_balances: vec![],
            post_token_balances: vec![],
            failed: false,
        };
        let err = verify_solana_transfer(&info, DEPOSIT_SOL, &sol_native()).unwrap_err();
        assert!(matches!(err, DepositError::Verification(_)));
    }

    #[test]
    fn test_solana_native_failed_tx() {
        let info = SolanaTransactionInfo {
            account_keys: vec![DEPOSIT_SOL.into()],
            pre_balances: vec![0],
            post_balances: vec![100],
            pre_token_balances: vec![],
            post_token_balances: vec![],
            failed: true,
        };
        assert!(verify_solana_transfer(&info, DEPOSIT_SOL, &sol_native()).is_err());
    }

    #[test]
    fn test_solana_token_delta_matched_by_owner_and_mint() {
        let info = SolanaTransactionInfo {
            account_keys: vec![SENDER_SOL.into()],
            pre_balances: vec![],
            post_balances: vec![],
            pre_token_balances: vec![
                token_balance(1, USDC_MINT, SENDER_SOL, "500000000"),
                token_balance(2, USDC_MINT, DEPOSIT_SOL, "1000000"),
            ],
            post_token_balances: vec![
                token_balance(1, USDC_MINT, SENDER_SOL, "400000000"),
                token_balance(2, USDC_MINT, DEPOSIT_SOL, "101000000"),
            ],
            failed: false,
        };
        let transfer = verify_solana_transfer(&info, DEPOSIT_SOL, &usdc()).unwrap();
        assert_eq!(transfer.amount_raw, 100_000_000);
        assert_eq!(transfer.from_address, SENDER_SOL);
    }

    #[test]
    fn test_solana_token_new_ata_has_no_pre_balance() {
        let info = SolanaTransactionInfo {
            account_keys: vec![SENDER_SOL.into()],
            pre_balances: vec![],
            post_balances: vec![],
            pre_token_balances: vec![],
            post_token_balances: vec![token_balance(3, USDC_MINT, DEPOSIT_SOL, "25000000")],
            failed: false,
        };
        let transfer = verify_solana_transfer(&info, DEPOSIT_SOL, &usdc()).unwrap();
        assert_eq!(transfer.amount_raw, 25_000_000);
    }

    #[test]
    fn test_solana_token_wrong_mint_rejected() {
        let info = SolanaTransactionInfo {
            account_keys: vec![SENDER_SOL.into()],
            pre_balances: vec![],
            post_balances: vec![],
            pre_token_balances: vec![],
            post_token_balances: vec![token_balance(
                1,
                "So11111111111111111111111111111111111111112",
                DEPOSIT_SOL,
                "999",
            )],
            failed: false,
        };
        assert!(verify_solana_transfer(&info, DEPOSIT_SOL, &usdc()).is_err());
    }

    fn trc20_log(contract_hex: &str, recipient_hex: &str, amount: u128) -> TronEventLog {
        TronEventLog {
            address: contract_hex.into(),
            topics: vec![
                tron_rpc::TRC20_TRANSFER_TOPIC.into(),
                format!("{}{}", "0".repeat(24), "11".repeat(20)),
                format!("{}{}", "0".repeat(24), recipient_hex),
            ],
            data: format!("{:064x}", amount),
        }
    }

    #[test]
    fn test_trc20_transfer_matched() {
        let currency = usdt_tron();
        let deposit = "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy";
        let contract_hex = hex::encode(
            &tron_address_to_raw(currency.contract.as_deref().unwrap()).unwrap()[1..],
        );
        let deposit_hex = hex::encode(&tron_address_to_raw(deposit).unwrap()[1..]);

        let info = TronTransactionInfo {
            success: true,
            logs: vec![trc20_log(&contract_hex, &deposit_hex, 50_000_000)],
        };
        let transfer = verify_tron_trc20_transfer(&info, deposit, &currency).unwrap();
        assert_eq!(transfer.amount_raw, 50_000_000);
        assert_eq!(transfer.from_address, format!("41{}", "11".repeat(20)));
    }

    #[test]
    fn test_trc20_wrong_recipient_rejected() {
        let currency = usdt_tron();
        let deposit = "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy";
        let contract_hex = hex::encode(
            &tron_address_to_raw(currency.contract.as_deref().unwrap()).unwrap()[1..],
        );

        let info = TronTransactionInfo {
            success: true,
            logs: vec![trc20_log(&contract_hex, &"ff".repeat(20), 50_000_000)],
        };
        let err = verify_tron_trc20_transfer(&info, deposit, &currency).unwrap_err();
        assert!(matches!(err, DepositError::Verification(_)));
    }

    #[test]
    fn test_trc20_failed_receipt_rejected() {
        let currency = usdt_tron();
        let info = TronTransactionInfo {
            success: false,
            logs: vec![],
        };
        assert!(verify_tron_trc20_transfer(
            &info,
            "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy",
            &currency
        )
        .is_err());
    }

    #[test]
    fn test_trc20_multiple_events_summed() {
        let currency = usdt_tron();
        let deposit = "TLsV52sRDL79HXGGm9yzwKibb6BeruhUzy";
        let contract_hex = hex::encode(
            &tron_address_to_raw(currency.contract.as_deref().unwrap()).unwrap()[1..],
        );
        let deposit_hex = hex::encode(&tron_address_to_raw(deposit).unwrap()[1..]);

        let info = TronTransactionInfo {
            success: true,
            logs: vec![
                trc20_log(&contract_hex, &deposit_hex, 1_000_000),
                trc20_log(&contract_hex, &deposit_hex, 2_500_000),
            ],
        };
        let transfer = verify_tron_trc20_transfer(&info, deposit, &currency).unwrap();
        assert_eq!(transfer.amount_raw, 3_500_000);
    }
}

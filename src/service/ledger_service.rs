//! 账本服务
//!
//! 所有余额变动都经由 repository::balances 的事务内原语（加款/扣款+历史）。
//! 提现不变式：余额在请求时与插入提现行同事务原子扣减，
//! 拒绝/取消时同事务原子退回；批准/完成只是状态翻转。

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::error::DepositError,
    infrastructure::db::PgPool,
    repository::{
        balances,
        balances::{Balance, BalanceHistory},
        withdrawals,
        withdrawals::Withdrawal,
    },
};

/// 内部记账单位（美元锚定，2位小数）
pub const LEDGER_CURRENCY: &str = "LU";

pub struct LedgerService {
    pool: PgPool,
}

impl LedgerService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn balance(&self, user_id: Uuid) -> Result<Balance, DepositError> {
        let existing =
            balances::get_by_user_and_currency(&self.pool, user_id, LEDGER_CURRENCY).await?;
        // 没有余额行等价于零余额
        Ok(existing.unwrap_or(Balance {
            id: Uuid::nil(),
            user_id,
            currency: LEDGER_CURRENCY.to_string(),
            balance: Decimal::ZERO,
            bonus: Decimal::ZERO,
            status: "active".to_string(),
            updated_at: chrono::Utc::now(),
        }))
    }

    pub async fn history(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BalanceHistory>, DepositError> {
        Ok(balances::list_history(&self.pool, user_id, limit, offset).await?)
    }

    /// 提现请求：扣款与插入提现行同事务，余额不足则整体失败
    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        blockchain: &str,
        to_address: &str,
        amount: Decimal,
    ) -> Result<Withdrawal, DepositError> {
        if amount <= Decimal::ZERO {
            return Err(DepositError::Validation(
                "withdrawal amount must be positive".into(),
            ));
        }
        if to_address.trim().is_empty() {
            return Err(DepositError::Validation(
                "withdrawal address is required".into(),
            ));
        }
        let amount = amount.round_dp(2);

        let mut tx = self.pool.begin().await?;

        let withdrawal = withdrawals::create_in_tx(
            &mut tx,
            user_id,
            LEDGER_CURRENCY,
            blockchain,
            to_address,
            amount,
        )
        .await?;

        let debited = balances::debit_in_tx(
            &mut tx,
            user_id,
            LEDGER_CURRENCY,
            amount,
            &format!("withdrawal:{}", withdrawal.id),
        )
        .await?;

        if debited.is_none() {
            tx.rollback().await?;
            return Err(DepositError::InsufficientBalance(format!(
                "balance below requested withdrawal of {}",
                amount
            )));
        }

        tx.commit().await?;
        info!(user_id = %user_id, withdrawal_id = %withdrawal.id, %amount, "withdrawal requested");
        Ok(withdrawal)
    }

    /// 用户取消：仅 requested 状态可取消，退款同事务
    pub async fn cancel_withdrawal(
        &self,
        user_id: Uuid,
        withdrawal_id: Uuid,
    ) -> Result<Withdrawal, DepositError> {
        let existing = withdrawals::get_by_id(&self.pool, withdrawal_id)
            .await?
            .ok_or_else(|| DepositError::NotFound("withdrawal not found".into()))?;
        if existing.user_id != user_id {
            return Err(DepositError::NotFound("withdrawal not found".into()));
        }

        self.refund_transition(withdrawal_id, "requested", "cancelled", None)
            .await
    }

    /// 管理端批准：requested → approved，不动余额
    pub async fn approve_withdrawal(&self, withdrawal_id: Uuid) -> Result<Withdrawal, DepositError> {
        let mut tx = self.pool.begin().await?;
        let updated = withdrawals::transition_in_tx(
            &mut tx,
            withdrawal_id,
            "requested",
            "approved",
            None,
            None,
        )
        .await?
        .ok_or_else(|| {
            DepositError::Validation("withdrawal is not in requested state".into())
        })?;
        tx.commit().await?;
        Ok(updated)
    }

    /// 管理端拒绝：requested|approved → rejected，退款同事务
    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: Uuid,
        reason: &str,
    ) -> Result<Withdrawal, DepositError> {
        // 先试 requested，再试 approved
        match self
            .refund_transition(withdrawal_id, "requested", "rejected", Some(reason))
            .await
        {
            Err(DepositError::Validation(_)) => {
                self.refund_transition(withdrawal_id, "approved", "rejected", Some(reason))
                    .await
            }
            other => other,
        }
    }

    /// 管理端完成：approved → completed，记录链上txid，不动余额
    pub async fn complete_withdrawal(
        &self,
        withdrawal_id: Uuid,
        txid: &str,
    ) -> Result<Withdrawal, DepositError> {
        let mut tx = self.pool.begin().await?;
        let updated = withdrawals::transition_in_tx(
            &mut tx,
            withdrawal_id,
            "approved",
            "completed",
            Some(txid),
            None,
        )
        .await?
        .ok_or_else(|| DepositError::Validation("withdrawal is not approved".into()))?;
        tx.commit().await?;
        Ok(updated)
    }

    pub async fn list_withdrawals(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Withdrawal>, DepositError> {
        Ok(withdrawals::list_by_user(&self.pool, user_id, limit, offset).await?)
    }

    /// 状态翻转 + 同事务退款
    async fn refund_transition(
        &self,
        withdrawal_id: Uuid,
        from_status: &str,
        to_status: &str,
        reason: Option<&str>,
    ) -> Result<Withdrawal, DepositError> {
        let mut tx = self.pool.begin().await?;

        let updated = withdrawals::transition_in_tx(
            &mut tx,
            withdrawal_id,
            from_status,
            to_status,
            None,
            reason,
        )
        .await?
        .ok_or_else(|| {
            DepositError::Validation(format!("withdrawal is not in {} state", from_status))
        })?;

        balances::credit_in_tx(
            &mut tx,
            updated.user_id,
            LEDGER_CURRENCY,
            updated.amount,
            &format!("withdrawal_refund:{}", updated.id),
        )
        .await?;

        tx.commit().await?;
        info!(
            withdrawal_id = %updated.id,
            status = %updated.status,
            amount = %updated.amount,
            "withdrawal refunded"
        );
        Ok(updated)
    }
}

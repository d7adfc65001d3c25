//! 内部账本
//!
//! 余额是美元锚定的内部记账单位（LU，2位小数）。每次变动都追加一条
//! balance_history。扣减类变动的 WHERE 条件里带余额检查，拒绝透支。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub balance: Decimal,
    pub bonus: Decimal,
    pub status: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BalanceHistory {
    pub id: Uuid,
    pub balance_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reason: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// 事务内加款：upsert 余额行并追加历史，返回更新后的余额
pub async fn credit_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    currency: &str,
    amount: Decimal,
    reason: &str,
) -> Result<Balance, sqlx::Error> {
    let rec = sqlx::query_as::<_, Balance>(
        r#"
        INSERT INTO balances (user_id, currency, balance)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, currency)
        DO UPDATE SET balance = balances.balance + $3, updated_at = now()
        RETURNING id, user_id, currency, balance, bonus, status, updated_at
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .bind(amount)
    .fetch_one(&mut **tx)
    .await?;

    append_history(tx, &rec, amount, reason).await?;
    Ok(rec)
}

/// 事务内扣款：余额不足时返回 None（不写任何行）
pub async fn debit_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    currency: &str,
    amount: Decimal,
    reason: &str,
) -> Result<Option<Balance>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Balance>(
        r#"
        UPDATE balances
        SET balance = balance - $3, updated_at = now()
        WHERE user_id = $1 AND currency = $2 AND balance >= $3
        RETURNING id, user_id, currency, balance, bonus, status, updated_at
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .bind(amount)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(ref balance) = rec {
        append_history(tx, balance, -amount, reason).await?;
    }
    Ok(rec)
}

/// 红利列加款（充值红利钩子，commit后尽力而为，单语句自成事务性）
pub async fn credit_bonus(
    pool: &PgPool,
    user_id: Uuid,
    currency: &str,
    amount: Decimal,
) -> Result<Balance, sqlx::Error> {
    let rec = sqlx::query_as::<_, Balance>(
        r#"
        INSERT INTO balances (user_id, currency, bonus)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, currency)
        DO UPDATE SET bonus = balances.bonus + $3, updated_at = now()
        RETURNING id, user_id, currency, balance, bonus, status, updated_at
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .bind(amount)
    .fetch_one(pool)
    .await?;

    Ok(rec)
}

async fn append_history(
    tx: &mut Transaction<'_, Postgres>,
    balance: &Balance,
    amount: Decimal,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO balance_history (balance_id, user_id, amount, balance_after, reason)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(balance.id)
    .bind(balance.user_id)
    .bind(amount)
    .bind(balance.balance)
    .bind(reason)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn get_by_user_and_currency(
    pool: &PgPool,
    user_id: Uuid,
    currency: &str,
) -> Result<Option<Balance>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Balance>(
        r#"
        SELECT id, user_id, currency, balance, bonus, status, updated_at
        FROM balances
        WHERE user_id = $1 AND currency = $2
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}

pub async fn list_history(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<BalanceHistory>, sqlx::Error> {
    let recs = sqlx::query_as::<_, BalanceHistory>(
        r#"
        SELECT id, balance_id, user_id, amount, balance_after, reason, created_at
        FROM balance_history
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(recs)
}

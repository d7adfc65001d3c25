//! 提现请求
//!
//! 余额在请求时原子扣减（与插入提现行同事务），拒绝/取消时原子退回。
//! status: requested -> approved -> completed | rejected | cancelled

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: String,
    pub blockchain: String,
    pub to_address: String,
    pub amount: Decimal,
    pub status: String,
    pub txid: Option<String>,
    pub reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

pub async fn create_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    currency: &str,
    blockchain: &str,
    to_address: &str,
    amount: Decimal,
) -> Result<Withdrawal, sqlx::Error> {
    let rec = sqlx::query_as::<_, Withdrawal>(
        r#"
        INSERT INTO withdrawals (user_id, currency, blockchain, to_address, amount)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING
            id, user_id, currency, blockchain, to_address, amount,
            status, txid, reason, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(currency)
    .bind(blockchain)
    .bind(to_address)
    .bind(amount)
    .fetch_one(&mut **tx)
    .await?;

    Ok(rec)
}

pub async fn get_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Withdrawal>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Withdrawal>(
        r#"
        SELECT
            id, user_id, currency, blockchain, to_address, amount,
            status, txid, reason, created_at, updated_at
        FROM withdrawals
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}

/// 状态推进带前置状态检查，返回 None 表示当前状态不允许该迁移
pub async fn transition_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    from_status: &str,
    to_status: &str,
    txid: Option<&str>,
    reason: Option<&str>,
) -> Result<Option<Withdrawal>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Withdrawal>(
        r#"
        UPDATE withdrawals
        SET status = $3,
            txid = COALESCE($4, txid),
            reason = COALESCE($5, reason),
            updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING
            id, user_id, currency, blockchain, to_address, amount,
            status, txid, reason, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(from_status)
    .bind(to_status)
    .bind(txid)
    .bind(reason)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(rec)
}

pub async fn list_by_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let recs = sqlx::query_as::<_, Withdrawal>(
        r#"
        SELECT
            id, user_id, currency, blockchain, to_address, amount,
            status, txid, reason, created_at, updated_at
        FROM withdrawals
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

pub async fn list_by_status(
    pool: &PgPool,
    status: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<Withdrawal>, sqlx::Error> {
    let recs = sqlx::query_as::<_, Withdrawal>(
        r#"
        SELECT
            id, user_id, currency, blockchain, to_address, amount,
            status, txid, reason, created_at, updated_at
        FROM withdrawals
        WHERE status = $1
        ORDER BY created_at ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(recs)
}

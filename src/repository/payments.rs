//! 充值流水
//!
//! txn_id 唯一约束是防止重复入账的唯一机制。确认入账的写入必须与
//! 账本加款在同一个数据库事务里提交。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Postgres, Transaction};
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

/// 已确认（终态，不可再变更）
pub const STATUS_CONFIRMED: i32 = 100;
/// 待确认
pub const STATUS_PENDING: i32 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub txn_id: String,
    pub user_id: Uuid,
    pub currency: String,
    pub blockchain: String,
    pub amount: Decimal,
    pub fiat_amount: Decimal,
    pub status: i32,
    pub status_text: String,
    pub address: String,
    pub from_address: String,
    pub bonus_id: Option<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
pub struct ConfirmPaymentInput {
    pub txn_id: String,
    pub user_id: Uuid,
    pub currency: String,
    pub blockchain: String,
    pub amount: Decimal,
    pub fiat_amount: Decimal,
    pub address: String,
    pub from_address: String,
    pub bonus_id: Option<Uuid>,
}

/// 抢占确认：插入已确认流水，或把未确认的同txn_id流水推进到已确认。
///
/// 返回 None 表示该 txn_id 已经被确认过（本次调用没有赢得入账权），
/// 调用方应当回滚事务并把已有流水当作成功结果返回。
pub async fn claim_confirmation(
    tx: &mut Transaction<'_, Postgres>,
    input: &ConfirmPaymentInput,
) -> Result<Option<Payment>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (
            txn_id, user_id, currency, blockchain, amount, fiat_amount,
            status, status_text, address, from_address, bonus_id
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'confirmed', $8, $9, $10)
        ON CONFLICT (txn_id) DO UPDATE SET
            status = EXCLUDED.status,
            status_text = EXCLUDED.status_text,
            amount = EXCLUDED.amount,
            fiat_amount = EXCLUDED.fiat_amount,
            from_address = EXCLUDED.from_address,
            updated_at = now()
        WHERE payments.status <> $7
        RETURNING
            id, txn_id, user_id, currency, blockchain, amount, fiat_amount,
            status, status_text, address, from_address, bonus_id, created_at, updated_at
        "#,
    )
    .bind(&input.txn_id)
    .bind(input.user_id)
    .bind(&input.currency)
    .bind(&input.blockchain)
    .bind(input.amount)
    .bind(input.fiat_amount)
    .bind(STATUS_CONFIRMED)
    .bind(&input.address)
    .bind(&input.from_address)
    .bind(input.bonus_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(rec)
}

pub async fn get_by_txn_id(pool: &PgPool, txn_id: &str) -> Result<Option<Payment>, sqlx::Error> {
    let rec = sqlx::query_as::<_, Payment>(
        r#"
        SELECT
            id, txn_id, user_id, currency, blockchain, amount, fiat_amount,
            status, status_text, address, from_address, bonus_id, created_at, updated_at
        FROM payments
        WHERE txn_id = $1
        "#,
    )
    .bind(txn_id)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}

pub async fn list_by_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Payment>, sqlx::Error> {
    let recs = sqlx::query_as::<_, Payment>(
        r#"
        SELECT
            id, txn_id, user_id, currency, blockchain, amount, fiat_amount,
            status, status_text, address, from_address, bonus_id, created_at, updated_at
        FROM payments
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

//! 归集审计记录
//!
//! append-only：先落 pending 记录，广播后写回 txid 与状态。
//! 落库的错误文本已经过脱敏，绝不包含私钥或助记词。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SweepRecord {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub user_id: Option<Uuid>,
    pub blockchain: String,
    pub derivation_index: i64,
    pub from_address: String,
    pub to_address: String,
    pub asset: String,
    pub amount_ui: Decimal,
    pub txid: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug)]
pub struct CreateSweepInput {
    pub admin_id: Uuid,
    pub user_id: Option<Uuid>,
    pub blockchain: String,
    pub derivation_index: i64,
    pub from_address: String,
    pub to_address: String,
    pub asset: String,
    pub amount_ui: Decimal,
}

pub async fn create_pending(
    pool: &PgPool,
    input: CreateSweepInput,
) -> Result<SweepRecord, sqlx::Error> {
    let rec = sqlx::query_as::<_, SweepRecord>(
        r#"
        INSERT INTO sweeps (
            admin_id, user_id, blockchain, derivation_index,
            from_address, to_address, asset, amount_ui, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
        RETURNING
            id, admin_id, user_id, blockchain, derivation_index, from_address,
            to_address, asset, amount_ui, txid, status, error, created_at, updated_at
        "#,
    )
    .bind(input.admin_id)
    .bind(input.user_id)
    .bind(&input.blockchain)
    .bind(input.derivation_index)
    .bind(&input.from_address)
    .bind(&input.to_address)
    .bind(&input.asset)
    .bind(input.amount_ui)
    .fetch_one(pool)
    .await?;

    Ok(rec)
}

pub async fn mark_confirmed(pool: &PgPool, id: Uuid, txid: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE sweeps
        SET status = 'confirmed', txid = $2, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(txid)
    .execute(pool)
    .await?;

    Ok(())
}

/// 失败收尾：txid 可能已广播（确认超时），也可能还没有
pub async fn mark_failed(
    pool: &PgPool,
    id: Uuid,
    txid: Option<&str>,
    error: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE sweeps
        SET status = 'failed', txid = $2, error = $3, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(txid)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

/// 幂等短路：同 (from, to, asset, amount) 的已确认归集
pub async fn find_confirmed(
    pool: &PgPool,
    from_address: &str,
    to_address: &str,
    asset: &str,
    amount_ui: Decimal,
) -> Result<Option<SweepRecord>, sqlx::Error> {
    let rec = sqlx::query_as::<_, SweepRecord>(
        r#"
        SELECT
            id, admin_id, user_id, blockchain, derivation_index, from_address,
            to_address, asset, amount_ui, txid, status, error, created_at, updated_at
        FROM sweeps
        WHERE from_address = $1 AND to_address = $2 AND asset = $3
          AND amount_ui = $4 AND status = 'confirmed'
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(from_address)
    .bind(to_address)
    .bind(asset)
    .bind(amount_ui)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}

/// 重复广播同一笔链上交易：按幂等成功处理
pub async fn get_by_txid(pool: &PgPool, txid: &str) -> Result<Option<SweepRecord>, sqlx::Error> {
    let rec = sqlx::query_as::<_, SweepRecord>(
        r#"
        SELECT
            id, admin_id, user_id, blockchain, derivation_index, from_address,
            to_address, asset, amount_ui, txid, status, error, created_at, updated_at
        FROM sweeps
        WHERE txid = $1
        "#,
    )
    .bind(txid)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}

pub async fn list(
    pool: &PgPool,
    blockchain: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<SweepRecord>, sqlx::Error> {
    let recs = sqlx::query_as::<_, SweepRecord>(
        r#"
        SELECT
            id, admin_id, user_id, blockchain, derivation_index, from_address,
            to_address, asset, amount_ui, txid, status, error, created_at, updated_at
        FROM sweeps
        WHERE ($1::TEXT IS NULL OR blockchain = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(blockchain)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(recs)
}

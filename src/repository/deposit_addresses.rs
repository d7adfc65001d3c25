//! 充值地址记录
//!
//! 每个 (用户, 链) 恰好一条记录，两个命名唯一约束区分并发冲突来源：
//! - deposit_addresses_user_chain_key：同一用户重复请求，读回已有记录即可
//! - deposit_addresses_chain_index_key：派生索引被并发占用，需要重新分配

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::infrastructure::db::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DepositAddress {
    pub id: Uuid,
    pub user_id: Uuid,
    pub blockchain: String,
    pub derivation_index: i64,
    pub address: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn create(
    pool: &PgPool,
    user_id: Uuid,
    blockchain: &str,
    derivation_index: i64,
    address: &str,
) -> Result<DepositAddress, sqlx::Error> {
    let rec = sqlx::query_as::<_, DepositAddress>(
        r#"
        INSERT INTO deposit_addresses (user_id, blockchain, derivation_index, address)
        VALUES ($1, $2, $3, $4)
        RETURNING id, user_id, blockchain, derivation_index, address, created_at
        "#,
    )
    .bind(user_id)
    .bind(blockchain)
    .bind(derivation_index)
    .bind(address)
    .fetch_one(pool)
    .await?;

    Ok(rec)
}

pub async fn get_by_user_and_chain(
    pool: &PgPool,
    user_id: Uuid,
    blockchain: &str,
) -> Result<Option<DepositAddress>, sqlx::Error> {
    let rec = sqlx::query_as::<_, DepositAddress>(
        r#"
        SELECT id, user_id, blockchain, derivation_index, address, created_at
        FROM deposit_addresses
        WHERE user_id = $1 AND blockchain = $2
        "#,
    )
    .bind(user_id)
    .bind(blockchain)
    .fetch_optional(pool)
    .await?;

    Ok(rec)
}

/// 管理端列表：按链分页列出已分配的地址
pub async fn list_by_chain(
    pool: &PgPool,
    blockchain: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<DepositAddress>, sqlx::Error> {
    let recs = sqlx::query_as::<_, DepositAddress>(
        r#"
        SELECT id, user_id, blockchain, derivation_index, address, created_at
        FROM deposit_addresses
        WHERE blockchain = $1
        ORDER BY derivation_index ASC
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

pub async fn count_by_chain(pool: &PgPool, blockchain: &str) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM deposit_addresses WHERE blockchain = $1")
        .bind(blockchain)
        .fetch_one(pool)
        .await?;

    Ok(row.0)
}

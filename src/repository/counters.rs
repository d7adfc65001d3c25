//! 单调递增计数器
//!
//! 每条链一个命名计数器，派生索引 = value - 1。
//! 自增在单条语句里完成，数据库保证原子性，不依赖应用层锁。

use crate::infrastructure::db::PgPool;

/// 原子自增并返回新值（首次调用时创建，返回1）
pub async fn increment(pool: &PgPool, name: &str) -> Result<i64, sqlx::Error> {
    let value: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO counters (name, value)
        VALUES ($1, 1)
        ON CONFLICT (name)
        DO UPDATE SET value = counters.value + 1
        RETURNING value
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(value.0)
}

/// 回滚自增：只在刚分配的值仍是最大值时回退，避免覆盖并发分配
pub async fn decrement_if_latest(
    pool: &PgPool,
    name: &str,
    allocated_value: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE counters
        SET value = value - 1
        WHERE name = $1 AND value = $2
        "#,
    )
    .bind(name)
    .bind(allocated_value)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn current_value(pool: &PgPool, name: &str) -> Result<Option<i64>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM counters WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|r| r.0))
}

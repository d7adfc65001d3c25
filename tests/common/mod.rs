//! 数据库集成测试公共工具
//!
//! 需要一个可写的Postgres实例：
//!   TEST_DATABASE_URL=postgres://... cargo test -- --ignored

use chipcore::infrastructure::db::PgPool;

/// 连接测试数据库并执行迁移
pub async fn test_pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .expect("TEST_DATABASE_URL must be set for database tests");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}

/// 全局唯一字符串，避免测试间数据串扰
pub fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

//! 独立迁移执行器
//! 生产部署时与服务进程分离运行：SKIP_MIGRATIONS=1 启动主进程

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chipcore=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = sqlx::Pool::<sqlx::Postgres>::connect(&database_url).await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Migration runner finished successfully");
    Ok(())
}

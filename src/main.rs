//! ChipCore 主入口
//! 链上充值网关：HD地址分配、充值验证入账、账本与归集

use std::sync::Arc;

use anyhow::Result;
use chipcore::{
    api,
    config::Config,
    infrastructure::{db, logging},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载环境变量与配置文件
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;
    config.validate()?;

    // JWT模块从环境变量读取secret，配置文件里的值在这里补齐
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", &config.jwt.secret);
    }

    // 2. 初始化日志
    // guard需要持有到进程结束，否则文件日志丢尾
    let _log_guard = logging::init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    tracing::info!("Starting ChipCore deposit gateway");

    // 3. 连接数据库
    let pool = db::init_pool(&config.database).await?;
    tracing::info!("Database connected");

    // 4. 运行数据库迁移
    // 生产环境建议单独运行迁移：SKIP_MIGRATIONS=1
    if std::env::var("SKIP_MIGRATIONS").is_err() {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations completed");
    } else {
        tracing::info!("Database migrations skipped (SKIP_MIGRATIONS=1)");
    }

    // 5. 初始化应用状态
    // 助记词解析失败在这里直接终止启动，绝不带病服务
    let config = Arc::new(config);
    let state = Arc::new(AppState::new(pool, config.clone())?);

    // 6. 构建API路由并启动服务器
    let app = api::routes(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| config.server.bind_addr.clone());
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);
    tracing::info!("Swagger UI: http://{}/docs", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

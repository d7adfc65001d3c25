use std::{sync::Arc, time::Instant};

use axum::{
    extract::{Request, State},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tracing::Level;
use utoipa::{OpenApi, ToSchema};

use crate::{
    api::response::{success_response, ApiResponse},
    app_state::AppState,
    error::AppError,
    infrastructure::db,
};

pub mod address_api;
pub mod admin_api;
pub mod balance_api;
pub mod deposit_api;
pub mod middleware;
pub mod response; // 统一响应格式
pub mod withdrawal_api;

#[derive(OpenApi)]
#[openapi(
    paths(
        address_api::get_deposit_address,
        address_api::create_deposit_address,
        deposit_api::verify_solana_deposit,
        deposit_api::verify_tron_deposit,
        deposit_api::scan_solana_deposits,
        deposit_api::list_deposits,
        balance_api::get_balance,
        balance_api::get_balance_history,
        withdrawal_api::create_withdrawal,
        withdrawal_api::cancel_withdrawal,
        withdrawal_api::list_withdrawals,
        admin_api::sweep,
        admin_api::list_sweeps,
        admin_api::list_deposit_addresses,
        admin_api::clear_balance_cache,
        admin_api::list_withdrawals,
        admin_api::approve_withdrawal,
        admin_api::reject_withdrawal,
        admin_api::complete_withdrawal,
        api_health,
        healthz
    ),
    components(
        schemas(
            address_api::DepositAddressResponse,
            deposit_api::VerifyDepositRequest,
            deposit_api::DepositResponse,
            deposit_api::ScanResponse,
            balance_api::BalanceResponse,
            balance_api::BalanceHistoryResponse,
            withdrawal_api::CreateWithdrawalRequest,
            withdrawal_api::WithdrawalResponse,
            admin_api::SweepRequest,
            admin_api::SweepResponse,
            admin_api::AddressBalancePage,
            admin_api::AddressBalanceRow,
            admin_api::RejectWithdrawalRequest,
            admin_api::CompleteWithdrawalRequest,
            HealthResponse
        )
    ),
    tags(
        (name = "deposit-address", description = "充值地址分配"),
        (name = "deposits", description = "充值验证与入账"),
        (name = "balance", description = "账本余额"),
        (name = "withdrawals", description = "提现"),
        (name = "admin", description = "归集与审批（管理员）")
    )
)]
struct ApiDoc;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub version: String,
}

/// GET /api/health
/// 连通性健康检查（含数据库）
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "服务与数据库正常", body = ApiResponse<HealthResponse>),
        (status = 500, description = "数据库不可用")
    ),
    tag = "health"
)]
pub async fn api_health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthResponse>>, AppError> {
    db::health_check(&state.pool).await?;
    success_response(HealthResponse {
        status: "ok".to_string(),
        database: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /healthz
/// 存活探针，不触达数据库
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "进程存活")),
    tag = "health"
)]
pub async fn healthz() -> &'static str {
    "ok"
}

pub fn routes(state: Arc<AppState>) -> Router {
    // 公开路由（不需要认证）
    let public_routes = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/health", get(api_health))
        .route(
            "/metrics",
            get(|| async { crate::metrics::render_prometheus().into_response() }),
        )
        .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()));

    // 用户路由（需要认证）
    let user_routes = Router::new()
        .merge(address_api::routes())
        .merge(balance_api::routes())
        .merge(deposit_api::routes())
        .merge(withdrawal_api::routes())
        .layer(from_fn(middleware::auth_middleware));

    // 管理端路由：认证之上再叠加角色检查
    let admin_routes = admin_api::routes()
        .layer(from_fn(middleware::admin_middleware))
        .layer(from_fn(middleware::auth_middleware));

    public_routes
        .nest("/api/v1", user_routes)
        .nest("/api/v1/admin", admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(middleware::trace_id_middleware))
                .layer(CorsLayer::permissive())
                .layer(from_fn(trace_log)),
        )
        .with_state(state)
}

async fn trace_log(req: Request, next: axum::middleware::Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let trace_id = req
        .headers()
        .get("X-Trace-Id")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let resp = next.run(req).await;
    let status = resp.status();
    let elapsed = start.elapsed().as_millis();
    tracing::event!(Level::INFO, trace_id=%trace_id, method=%method, path=%path, status=%status.as_u16(), elapsed_ms=%elapsed, "http_request");
    resp
}

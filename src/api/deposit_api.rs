//! 充值验证接口

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        middleware::AuthInfo,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    domain::chain::Blockchain,
    error::AppError,
    metrics,
    repository::payments::{self, Payment},
    service::deposit_service::DepositOutcome,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyDepositRequest {
    /// 币种标识（SOL / USDC / TRX / USDT）
    pub currency: String,
    /// 链上交易ID（Solana签名 / TRON txid）
    pub txn_id: String,
    /// 可选的充值红利活动ID
    pub bonus_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositResponse {
    pub txn_id: String,
    pub currency: String,
    pub blockchain: String,
    /// 链上金额（UI单位）
    pub amount: Decimal,
    /// 入账金额（LU）
    pub ledger_amount: Decimal,
    pub status: String,
    /// 本次请求是否实际入账（false = 此前已确认）
    pub credited: bool,
}

impl DepositResponse {
    fn from_outcome(outcome: DepositOutcome) -> Self {
        Self::from_payment(outcome.payment, outcome.credited)
    }

    fn from_payment(payment: Payment, credited: bool) -> Self {
        Self {
            txn_id: payment.txn_id,
            currency: payment.currency,
            blockchain: payment.blockchain,
            amount: payment.amount,
            ledger_amount: payment.fiat_amount,
            status: payment.status_text,
            credited,
        }
    }
}

async fn verify_deposit(
    state: Arc<AppState>,
    auth: AuthInfo,
    blockchain: Blockchain,
    req: VerifyDepositRequest,
    endpoint: &'static str,
) -> Result<Json<ApiResponse<DepositResponse>>, AppError> {
    let outcome = state
        .deposit_service
        .verify_and_credit(
            auth.user_id,
            blockchain,
            &req.currency,
            &req.txn_id,
            req.bonus_id,
        )
        .await
        .map_err(|e| {
            metrics::count_err(endpoint);
            AppError::from(e)
        })?;

    metrics::count_ok(endpoint);
    success_response(DepositResponse::from_outcome(outcome))
}

/// POST /api/v1/deposits/solana
#[utoipa::path(
    post,
    path = "/api/v1/deposits/solana",
    request_body = VerifyDepositRequest,
    responses(
        (status = 200, description = "验证通过并入账（或已入账）", body = ApiResponse<DepositResponse>),
        (status = 400, description = "验证失败 / 低于最低入账金额"),
        (status = 404, description = "链上找不到该交易")
    ),
    tag = "deposits"
)]
pub async fn verify_solana_deposit(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Json(req): Json<VerifyDepositRequest>,
) -> Result<Json<ApiResponse<DepositResponse>>, AppError> {
    verify_deposit(state, auth, Blockchain::Solana, req, "deposit_solana").await
}

/// POST /api/v1/deposits/tron
#[utoipa::path(
    post,
    path = "/api/v1/deposits/tron",
    request_body = VerifyDepositRequest,
    responses(
        (status = 200, description = "验证通过并入账（或已入账）", body = ApiResponse<DepositResponse>),
        (status = 400, description = "验证失败 / 低于最低入账金额"),
        (status = 404, description = "链上找不到该交易")
    ),
    tag = "deposits"
)]
pub async fn verify_tron_deposit(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Json(req): Json<VerifyDepositRequest>,
) -> Result<Json<ApiResponse<DepositResponse>>, AppError> {
    verify_deposit(state, auth, Blockchain::Tron, req, "deposit_tron").await
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScanResponse {
    /// 本次扫描新入账的充值
    pub credited: Vec<DepositResponse>,
}

/// POST /api/v1/deposits/solana/scan
/// 批量扫描自己的Solana充值地址
#[utoipa::path(
    post,
    path = "/api/v1/deposits/solana/scan",
    responses(
        (status = 200, description = "扫描结果", body = ApiResponse<ScanResponse>),
        (status = 404, description = "尚未分配Solana充值地址")
    ),
    tag = "deposits"
)]
pub async fn scan_solana_deposits(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
) -> Result<Json<ApiResponse<ScanResponse>>, AppError> {
    let outcomes = state
        .deposit_service
        .scan_solana_deposits(auth.user_id)
        .await
        .map_err(|e| {
            metrics::count_err("deposit_scan");
            AppError::from(e)
        })?;

    metrics::count_ok("deposit_scan");
    success_response(ScanResponse {
        credited: outcomes
            .into_iter()
            .map(DepositResponse::from_outcome)
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ListQuery {
    pub fn limit_offset(&self) -> (i64, i64) {
        let page_size = self.page_size.unwrap_or(20).clamp(1, 100);
        let page = self.page.unwrap_or(1).max(1);
        (page_size, (page - 1) * page_size)
    }
}

/// GET /api/v1/deposits
/// 自己的充值流水
#[utoipa::path(
    get,
    path = "/api/v1/deposits",
    params(
        ("page" = Option<i64>, Query, description = "页码，从1开始"),
        ("page_size" = Option<i64>, Query, description = "每页条数，默认20")
    ),
    responses((status = 200, description = "充值流水列表", body = ApiResponse<Vec<DepositResponse>>)),
    tag = "deposits"
)]
pub async fn list_deposits(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<DepositResponse>>>, AppError> {
    let (limit, offset) = query.limit_offset();
    let records = payments::list_by_user(&state.pool, auth.user_id, limit, offset).await?;

    success_response(
        records
            .into_iter()
            .map(|p| DepositResponse::from_payment(p, false))
            .collect(),
    )
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/deposits", get(list_deposits))
        .route("/deposits/solana", post(verify_solana_deposit))
        .route("/deposits/solana/scan", post(scan_solana_deposits))
        .route("/deposits/tron", post(verify_tron_deposit))
}

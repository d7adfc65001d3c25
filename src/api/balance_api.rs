//! 账本余额接口

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    api::{
        deposit_api::ListQuery,
        middleware::AuthInfo,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    error::AppError,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub currency: String,
    pub balance: Decimal,
    pub bonus: Decimal,
}

/// GET /api/v1/balance
/// 自己的账本余额（LU）
#[utoipa::path(
    get,
    path = "/api/v1/balance",
    responses((status = 200, description = "账本余额", body = ApiResponse<BalanceResponse>)),
    tag = "balance"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
) -> Result<Json<ApiResponse<BalanceResponse>>, AppError> {
    let balance = state.ledger_service.balance(auth.user_id).await?;
    success_response(BalanceResponse {
        currency: balance.currency,
        balance: balance.balance,
        bonus: balance.bonus,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceHistoryResponse {
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub reason: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// GET /api/v1/balance/history
/// 账本变动历史
#[utoipa::path(
    get,
    path = "/api/v1/balance/history",
    params(
        ("page" = Option<i64>, Query, description = "页码，从1开始"),
        ("page_size" = Option<i64>, Query, description = "每页条数，默认20")
    ),
    responses((status = 200, description = "变动历史", body = ApiResponse<Vec<BalanceHistoryResponse>>)),
    tag = "balance"
)]
pub async fn get_balance_history(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<BalanceHistoryResponse>>>, AppError> {
    let (limit, offset) = query.limit_offset();
    let entries = state
        .ledger_service
        .history(auth.user_id, limit, offset)
        .await?;

    success_response(
        entries
            .into_iter()
            .map(|h| BalanceHistoryResponse {
                amount: h.amount,
                balance_after: h.balance_after,
                reason: h.reason,
                created_at: h.created_at,
            })
            .collect(),
    )
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/balance", get(get_balance))
        .route("/balance/history", get(get_balance_history))
}

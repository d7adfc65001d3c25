//! 提现接口（用户侧）
//!
//! 余额在请求时原子扣减，取消时原子退回；审批在管理端接口里。

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        deposit_api::ListQuery,
        middleware::AuthInfo,
        response::{success_response, ApiResponse},
    },
    app_state::AppState,
    domain::chain::Blockchain,
    error::AppError,
    repository::withdrawals::Withdrawal,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWithdrawalRequest {
    pub blockchain: String,
    /// 提现目标链上地址
    pub to_address: String,
    /// 提现金额（LU）
    pub amount: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawalResponse {
    pub id: Uuid,
    pub blockchain: String,
    pub to_address: String,
    pub amount: Decimal,
    pub status: String,
    pub txid: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(w: Withdrawal) -> Self {
        Self {
            id: w.id,
            blockchain: w.blockchain,
            to_address: w.to_address,
            amount: w.amount,
            status: w.status,
            txid: w.txid,
            created_at: w.created_at,
        }
    }
}

/// POST /api/v1/withdrawals
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals",
    request_body = CreateWithdrawalRequest,
    responses(
        (status = 200, description = "提现已登记，余额已扣减", body = ApiResponse<WithdrawalResponse>),
        (status = 400, description = "余额不足或参数错误")
    ),
    tag = "withdrawals"
)]
pub async fn create_withdrawal(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Json(req): Json<CreateWithdrawalRequest>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, AppError> {
    let blockchain = Blockchain::parse(&req.blockchain)?;
    let withdrawal = state
        .ledger_service
        .request_withdrawal(
            auth.user_id,
            blockchain.as_str(),
            &req.to_address,
            req.amount,
        )
        .await?;
    success_response(withdrawal.into())
}

/// POST /api/v1/withdrawals/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/v1/withdrawals/{id}/cancel",
    params(("id" = Uuid, Path, description = "提现ID")),
    responses(
        (status = 200, description = "已取消并退款", body = ApiResponse<WithdrawalResponse>),
        (status = 400, description = "当前状态不可取消")
    ),
    tag = "withdrawals"
)]
pub async fn cancel_withdrawal(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, AppError> {
    let withdrawal = state
        .ledger_service
        .cancel_withdrawal(auth.user_id, id)
        .await?;
    success_response(withdrawal.into())
}

/// GET /api/v1/withdrawals
#[utoipa::path(
    get,
    path = "/api/v1/withdrawals",
    params(
        ("page" = Option<i64>, Query, description = "页码，从1开始"),
        ("page_size" = Option<i64>, Query, description = "每页条数，默认20")
    ),
    responses((status = 200, description = "自己的提现记录", body = ApiResponse<Vec<WithdrawalResponse>>)),
    tag = "withdrawals"
)]
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<WithdrawalResponse>>>, AppError> {
    let (limit, offset) = query.limit_offset();
    let records = state
        .ledger_service
        .list_withdrawals(auth.user_id, limit, offset)
        .await?;
    success_response(records.into_iter().map(Into::into).collect())
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/withdrawals", get(list_withdrawals).post(create_withdrawal))
        .route("/withdrawals/:id/cancel", post(cancel_withdrawal))
}

//! 充值地址接口

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
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
    repository::deposit_addresses::DepositAddress,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositAddressResponse {
    pub id: Uuid,
    pub blockchain: String,
    pub address: String,
    pub derivation_index: i64,
    /// 本次请求是否新分配
    pub created: bool,
}

impl DepositAddressResponse {
    fn from_record(record: DepositAddress, created: bool) -> Self {
        Self {
            id: record.id,
            blockchain: record.blockchain,
            address: record.address,
            derivation_index: record.derivation_index,
            created,
        }
    }
}

/// GET /api/v1/{blockchain}/deposit-address
/// 查询自己在该链上的充值地址，未分配返回404
#[utoipa::path(
    get,
    path = "/api/v1/{blockchain}/deposit-address",
    params(("blockchain" = String, Path, description = "solana | tron")),
    responses(
        (status = 200, description = "已分配的充值地址", body = ApiResponse<DepositAddressResponse>),
        (status = 404, description = "尚未分配")
    ),
    tag = "deposit-address"
)]
pub async fn get_deposit_address(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Path(blockchain): Path<String>,
) -> Result<Json<ApiResponse<DepositAddressResponse>>, AppError> {
    let blockchain = Blockchain::parse(&blockchain)?;
    let record = state
        .address_service
        .get(auth.user_id, blockchain)
        .await?
        .ok_or_else(|| AppError::not_found("no deposit address allocated for this blockchain"))?;

    metrics::count_ok("get_deposit_address");
    success_response(DepositAddressResponse::from_record(record, false))
}

/// POST /api/v1/{blockchain}/deposit-address
/// 取或建充值地址（幂等）
#[utoipa::path(
    post,
    path = "/api/v1/{blockchain}/deposit-address",
    params(("blockchain" = String, Path, description = "solana | tron")),
    responses(
        (status = 200, description = "充值地址（已存在或新分配）", body = ApiResponse<DepositAddressResponse>)
    ),
    tag = "deposit-address"
)]
pub async fn create_deposit_address(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Path(blockchain): Path<String>,
) -> Result<Json<ApiResponse<DepositAddressResponse>>, AppError> {
    let blockchain = Blockchain::parse(&blockchain)?;
    let allocated = state
        .address_service
        .get_or_create(auth.user_id, blockchain)
        .await
        .map_err(|e| {
            metrics::count_err("create_deposit_address");
            AppError::from(e)
        })?;

    metrics::count_ok("create_deposit_address");
    success_response(DepositAddressResponse::from_record(
        allocated.record,
        allocated.created,
    ))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route(
        "/:blockchain/deposit-address",
        get(get_deposit_address).post(create_deposit_address),
    )
}

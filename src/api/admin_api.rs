//! 管理端接口
//!
//! 归集、归集审计、充值地址余额列表（有界并发 + TTL缓存）、提现审批。

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    api::{
        deposit_api::ListQuery,
        middleware::AuthInfo,
        response::{success_response, ApiResponse},
        withdrawal_api::WithdrawalResponse,
    },
    app_state::AppState,
    domain::{chain::Blockchain, currency::Currency},
    error::AppError,
    metrics,
    repository::{deposit_addresses, sweeps, sweeps::SweepRecord, withdrawals},
    service::sweep_service::SweepSource,
};

/// 余额列表的RPC并发上限
const BALANCE_FANOUT_CONCURRENCY: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 归集
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize, ToSchema)]
pub struct SweepRequest {
    /// 归集资产（SOL / USDC / TRX / USDT）
    pub currency: String,
    /// 按用户归集（与 derivation_index 二选一）
    pub user_id: Option<Uuid>,
    /// 按派生索引归集，无需DB记录
    pub derivation_index: Option<u32>,
    /// 归集金额（UI单位），缺省归集上限
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepResponse {
    pub id: Uuid,
    pub blockchain: String,
    pub from_address: String,
    pub to_address: String,
    pub asset: String,
    pub amount: Decimal,
    pub txid: Option<String>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<SweepRecord> for SweepResponse {
    fn from(r: SweepRecord) -> Self {
        Self {
            id: r.id,
            blockchain: r.blockchain,
            from_address: r.from_address,
            to_address: r.to_address,
            asset: r.asset,
            amount: r.amount_ui,
            txid: r.txid,
            status: r.status,
            error: r.error,
            created_at: r.created_at,
        }
    }
}

/// POST /api/v1/admin/{blockchain}/sweep
#[utoipa::path(
    post,
    path = "/api/v1/admin/{blockchain}/sweep",
    params(("blockchain" = String, Path, description = "solana | tron")),
    request_body = SweepRequest,
    responses(
        (status = 200, description = "归集已确认（或已存在的幂等结果）", body = ApiResponse<SweepResponse>),
        (status = 400, description = "余额/手续费不足或参数错误"),
        (status = 502, description = "广播或确认失败，已落审计记录")
    ),
    tag = "admin"
)]
pub async fn sweep(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthInfo>,
    Path(blockchain): Path<String>,
    Json(req): Json<SweepRequest>,
) -> Result<Json<ApiResponse<SweepResponse>>, AppError> {
    let blockchain = Blockchain::parse(&blockchain)?;

    let source = match (req.user_id, req.derivation_index) {
        (Some(user_id), None) => SweepSource::User(user_id),
        (None, Some(index)) => SweepSource::Index(index),
        _ => {
            return Err(AppError::validation_failed(
                "exactly one of user_id or derivation_index is required",
            ))
        }
    };

    let record = state
        .sweep_service
        .sweep(auth.user_id, blockchain, &req.currency, source, req.amount)
        .await
        .map_err(|e| {
            metrics::count_err("admin_sweep");
            AppError::from(e)
        })?;

    metrics::count_ok("admin_sweep");
    success_response(record.into())
}

#[derive(Debug, Deserialize)]
pub struct SweepListQuery {
    pub blockchain: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// GET /api/v1/admin/sweeps
#[utoipa::path(
    get,
    path = "/api/v1/admin/sweeps",
    params(
        ("blockchain" = Option<String>, Query, description = "按链过滤"),
        ("page" = Option<i64>, Query, description = "页码，从1开始"),
        ("page_size" = Option<i64>, Query, description = "每页条数，默认20")
    ),
    responses((status = 200, description = "归集审计记录", body = ApiResponse<Vec<SweepResponse>>)),
    tag = "admin"
)]
pub async fn list_sweeps(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SweepListQuery>,
) -> Result<Json<ApiResponse<Vec<SweepResponse>>>, AppError> {
    let blockchain = query
        .blockchain
        .as_deref()
        .map(Blockchain::parse)
        .transpose()?;

    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);
    let records = sweeps::list(
        &state.pool,
        blockchain.map(|b| b.as_str()),
        page_size,
        (page - 1) * page_size,
    )
    .await?;

    success_response(records.into_iter().map(Into::into).collect())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 充值地址余额列表
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddressBalancePage {
    /// 该链已分配地址总数
    pub total: i64,
    pub rows: Vec<AddressBalanceRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddressBalanceRow {
    pub user_id: Uuid,
    pub derivation_index: i64,
    pub address: String,
    /// 原生资产余额（UI单位）；RPC失败时为0
    pub native_balance: Decimal,
    /// 链上稳定币余额（UI单位）；RPC失败时为0
    pub token_balance: Decimal,
}

/// 单个地址的链上余额，失败降级为零余额行
async fn address_balances(
    state: &AppState,
    blockchain: Blockchain,
    native: &Currency,
    token: &Currency,
    record: deposit_addresses::DepositAddress,
) -> AddressBalanceRow {
    let mut row = AddressBalanceRow {
        user_id: record.user_id,
        derivation_index: record.derivation_index,
        address: record.address.clone(),
        native_balance: Decimal::ZERO,
        token_balance: Decimal::ZERO,
    };

    match blockchain {
        Blockchain::Solana => {
            match state.solana.get_balance(&record.address).await {
                Ok(lamports) => row.native_balance = native.raw_to_ui(lamports as u128),
                Err(e) => warn!(address = %record.address, error = %e, "balance lookup failed"),
            }
            if let Ok(mint) = token.contract_address() {
                match state.solana.get_token_accounts_by_owner(&record.address, mint).await {
                    Ok(accounts) => {
                        let raw: u128 = accounts.iter().map(|a| a.amount as u128).sum();
                        row.token_balance = token.raw_to_ui(raw);
                    }
                    Err(e) => {
                        warn!(address = %record.address, error = %e, "token balance lookup failed")
                    }
                }
            }
        }
        Blockchain::Tron => {
            match state.tron.get_balance_sun(&record.address).await {
                Ok(sun) => row.native_balance = native.raw_to_ui(sun as u128),
                Err(e) => warn!(address = %record.address, error = %e, "balance lookup failed"),
            }
            if let Ok(contract) = token.contract_address() {
                match state.tron.get_trc20_balance(&record.address, contract).await {
                    Ok(raw) => row.token_balance = token.raw_to_ui(raw),
                    Err(e) => {
                        warn!(address = %record.address, error = %e, "token balance lookup failed")
                    }
                }
            }
        }
    }

    row
}

/// GET /api/v1/admin/{blockchain}/deposit-addresses
/// 已分配地址及链上余额；结果带TTL缓存，归集确认后失效
#[utoipa::path(
    get,
    path = "/api/v1/admin/{blockchain}/deposit-addresses",
    params(
        ("blockchain" = String, Path, description = "solana | tron"),
        ("page" = Option<i64>, Query, description = "页码，从1开始"),
        ("page_size" = Option<i64>, Query, description = "每页条数，默认20")
    ),
    responses((status = 200, description = "地址与余额列表", body = ApiResponse<AddressBalancePage>)),
    tag = "admin"
)]
pub async fn list_deposit_addresses(
    State(state): State<Arc<AppState>>,
    Path(blockchain): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<AddressBalancePage>>, AppError> {
    let blockchain = Blockchain::parse(&blockchain)?;
    let (limit, offset) = query.limit_offset();

    let cache_key = format!("addresses:{}:{}:{}", blockchain, limit, offset);
    if let Some(cached) = state.balance_cache.get(&cache_key).await {
        let page: AddressBalancePage = serde_json::from_value(cached)?;
        return success_response(page);
    }

    let native = state
        .registry
        .resolve(blockchain.native_symbol(), blockchain)?;
    let token_id = match blockchain {
        Blockchain::Solana => "USDC",
        Blockchain::Tron => "USDT",
    };
    let token = state.registry.resolve(token_id, blockchain)?;

    let total = deposit_addresses::count_by_chain(&state.pool, blockchain.as_str()).await?;
    let records =
        deposit_addresses::list_by_chain(&state.pool, blockchain.as_str(), limit, offset).await?;

    let rows: Vec<AddressBalanceRow> = stream::iter(records)
        .map(|record| address_balances(&state, blockchain, native, token, record))
        .buffer_unordered(BALANCE_FANOUT_CONCURRENCY)
        .collect()
        .await;

    let mut rows = rows;
    rows.sort_by_key(|r| r.derivation_index);

    let page = AddressBalancePage { total, rows };
    state
        .balance_cache
        .insert(cache_key, serde_json::to_value(&page)?)
        .await;

    success_response(page)
}

/// POST /api/v1/admin/balance-cache/clear
#[utoipa::path(
    post,
    path = "/api/v1/admin/balance-cache/clear",
    responses((status = 200, description = "缓存已清空", body = ApiResponse<serde_json::Value>)),
    tag = "admin"
)]
pub async fn clear_balance_cache(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    state.balance_cache.clear().await;
    success_response(serde_json::json!({ "cleared": true }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// 提现审批
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct WithdrawalListQuery {
    /// requested | approved | completed | rejected | cancelled
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// GET /api/v1/admin/withdrawals
/// 审批队列：默认列出待审批（requested）的提现
#[utoipa::path(
    get,
    path = "/api/v1/admin/withdrawals",
    params(
        ("status" = Option<String>, Query, description = "按状态过滤，默认requested"),
        ("page" = Option<i64>, Query, description = "页码，从1开始"),
        ("page_size" = Option<i64>, Query, description = "每页条数，默认20")
    ),
    responses((status = 200, description = "提现列表", body = ApiResponse<Vec<WithdrawalResponse>>)),
    tag = "admin"
)]
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WithdrawalListQuery>,
) -> Result<Json<ApiResponse<Vec<WithdrawalResponse>>>, AppError> {
    let status = query.status.as_deref().unwrap_or("requested");
    let page_size = query.page_size.unwrap_or(20).clamp(1, 100);
    let page = query.page.unwrap_or(1).max(1);

    let records =
        withdrawals::list_by_status(&state.pool, status, page_size, (page - 1) * page_size)
            .await?;
    success_response(records.into_iter().map(Into::into).collect())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RejectWithdrawalRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CompleteWithdrawalRequest {
    /// 链上交易ID
    pub txid: String,
}

/// POST /api/v1/admin/withdrawals/{id}/approve
#[utoipa::path(
    post,
    path = "/api/v1/admin/withdrawals/{id}/approve",
    params(("id" = Uuid, Path, description = "提现ID")),
    responses((status = 200, description = "已批准", body = ApiResponse<WithdrawalResponse>)),
    tag = "admin"
)]
pub async fn approve_withdrawal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, AppError> {
    let withdrawal = state.ledger_service.approve_withdrawal(id).await?;
    success_response(withdrawal.into())
}

/// POST /api/v1/admin/withdrawals/{id}/reject
#[utoipa::path(
    post,
    path = "/api/v1/admin/withdrawals/{id}/reject",
    params(("id" = Uuid, Path, description = "提现ID")),
    request_body = RejectWithdrawalRequest,
    responses((status = 200, description = "已拒绝并退款", body = ApiResponse<WithdrawalResponse>)),
    tag = "admin"
)]
pub async fn reject_withdrawal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectWithdrawalRequest>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, AppError> {
    let withdrawal = state
        .ledger_service
        .reject_withdrawal(id, &req.reason)
        .await?;
    success_response(withdrawal.into())
}

/// POST /api/v1/admin/withdrawals/{id}/complete
#[utoipa::path(
    post,
    path = "/api/v1/admin/withdrawals/{id}/complete",
    params(("id" = Uuid, Path, description = "提现ID")),
    request_body = CompleteWithdrawalRequest,
    responses((status = 200, description = "已完成", body = ApiResponse<WithdrawalResponse>)),
    tag = "admin"
)]
pub async fn complete_withdrawal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteWithdrawalRequest>,
) -> Result<Json<ApiResponse<WithdrawalResponse>>, AppError> {
    let withdrawal = state
        .ledger_service
        .complete_withdrawal(id, &req.txid)
        .await?;
    success_response(withdrawal.into())
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:blockchain/sweep", post(sweep))
        .route("/sweeps", get(list_sweeps))
        .route("/:blockchain/deposit-addresses", get(list_deposit_addresses))
        .route("/balance-cache/clear", post(clear_balance_cache))
        .route("/withdrawals", get(list_withdrawals))
        .route("/withdrawals/:id/approve", post(approve_withdrawal))
        .route("/withdrawals/:id/reject", post(reject_withdrawal))
        .route("/withdrawals/:id/complete", post(complete_withdrawal))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::infrastructure::secret_sanitize::sanitize_secrets;

#[derive(Debug, Clone)]
pub enum AppErrorCode {
    // HTTP 基础错误码
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    Timeout,
    Internal,

    // 业务错误码
    ConfigurationError,
    ValidationFailed,
    InvalidAddress,
    InvalidAmount,
    InvalidMnemonic,
    ChainNotSupported,
    CurrencyNotSupported,
    TransactionNotFound,
    VerificationFailed,
    BelowMinimumDeposit,
    InsufficientBalance,
    InsufficientFeeBalance,
    PriceUnavailable,
    RpcError,
    ExternalServiceError,
    DatabaseError,
    SweepFailed,
    DuplicateRequest,
    PermissionDenied,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: AppErrorCode,
    pub message: String,
    pub status: StatusCode,
    pub trace_id: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    trace_id: Option<&'a str>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code_str = match self.code {
            // HTTP 基础错误码
            AppErrorCode::BadRequest => "bad_request",
            AppErrorCode::Unauthorized => "unauthorized",
            AppErrorCode::Forbidden => "forbidden",
            AppErrorCode::NotFound => "not_found",
            AppErrorCode::Timeout => "timeout",
            AppErrorCode::Internal => "internal",

            // 业务错误码
            AppErrorCode::ConfigurationError => "configuration_error",
            AppErrorCode::ValidationFailed => "validation_failed",
            AppErrorCode::InvalidAddress => "invalid_address",
            AppErrorCode::InvalidAmount => "invalid_amount",
            AppErrorCode::InvalidMnemonic => "invalid_mnemonic",
            AppErrorCode::ChainNotSupported => "chain_not_supported",
            AppErrorCode::CurrencyNotSupported => "currency_not_supported",
            AppErrorCode::TransactionNotFound => "transaction_not_found",
            AppErrorCode::VerificationFailed => "verification_failed",
            AppErrorCode::BelowMinimumDeposit => "below_minimum_deposit",
            AppErrorCode::InsufficientBalance => "insufficient_balance",
            AppErrorCode::InsufficientFeeBalance => "insufficient_fee_balance",
            AppErrorCode::PriceUnavailable => "price_unavailable",
            AppErrorCode::RpcError => "rpc_error",
            AppErrorCode::ExternalServiceError => "external_service_error",
            AppErrorCode::DatabaseError => "database_error",
            AppErrorCode::SweepFailed => "sweep_failed",
            AppErrorCode::DuplicateRequest => "duplicate_request",
            AppErrorCode::PermissionDenied => "permission_denied",
        };
        // 出口统一脱敏：助记词/种子/私钥绝不允许出现在响应里
        let message = sanitize_secrets(&self.message);
        let body = ErrorBody {
            code: code_str,
            message: &message,
            trace_id: self.trace_id.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::BadRequest,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::NotFound,
            message: msg.into(),
            status: StatusCode::NOT_FOUND,
            trace_id: None,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::Internal,
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            trace_id: None,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::Unauthorized,
            message: msg.into(),
            status: StatusCode::UNAUTHORIZED,
            trace_id: None,
        }
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::PermissionDenied,
            message: msg.into(),
            status: StatusCode::FORBIDDEN,
            trace_id: None,
        }
    }

    /// 设置追踪ID
    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    // 业务错误辅助函数
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ConfigurationError,
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            trace_id: None,
        }
    }

    pub fn validation_failed(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ValidationFailed,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidAddress,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidAmount,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn invalid_mnemonic(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InvalidMnemonic,
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            trace_id: None,
        }
    }

    pub fn chain_not_supported(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ChainNotSupported,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn currency_not_supported(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::CurrencyNotSupported,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn transaction_not_found(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::TransactionNotFound,
            message: msg.into(),
            status: StatusCode::NOT_FOUND,
            trace_id: None,
        }
    }

    pub fn verification_failed(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::VerificationFailed,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn below_minimum_deposit(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::BelowMinimumDeposit,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn insufficient_balance(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InsufficientBalance,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn insufficient_fee_balance(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::InsufficientFeeBalance,
            message: msg.into(),
            status: StatusCode::BAD_REQUEST,
            trace_id: None,
        }
    }

    pub fn price_unavailable(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::PriceUnavailable,
            message: msg.into(),
            status: StatusCode::BAD_GATEWAY,
            trace_id: None,
        }
    }

    pub fn rpc_error(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::RpcError,
            message: msg.into(),
            status: StatusCode::BAD_GATEWAY,
            trace_id: None,
        }
    }

    pub fn external_service_error(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::ExternalServiceError,
            message: msg.into(),
            status: StatusCode::BAD_GATEWAY,
            trace_id: None,
        }
    }

    pub fn database_error(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::DatabaseError,
            message: msg.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            trace_id: None,
        }
    }

    pub fn sweep_failed(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::SweepFailed,
            message: msg.into(),
            status: StatusCode::BAD_GATEWAY,
            trace_id: None,
        }
    }

    pub fn duplicate_request(msg: impl Into<String>) -> Self {
        Self {
            code: AppErrorCode::DuplicateRequest,
            message: msg.into(),
            status: StatusCode::CONFLICT,
            trace_id: None,
        }
    }
}

// 从 serde_json 错误转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON serialization error: {}", err))
    }
}

// 从 SQLx 错误转换
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found("Resource not found"),
            sqlx::Error::Database(ref db_err) => {
                // 检查是否是约束违规（如唯一性冲突）
                if let Some(code) = db_err.code() {
                    if code == "23505" {
                        // PostgreSQL unique_violation
                        return Self::duplicate_request("Resource already exists");
                    }
                    if code == "23503" {
                        // PostgreSQL foreign_key_violation
                        return Self::bad_request("Foreign key constraint violation");
                    }
                }
                Self::database_error(format!("Database error: {}", db_err))
            }
            _ => Self::database_error(format!("Database operation failed: {}", err)),
        }
    }
}

// 从 UUID 错误转换
impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        Self::bad_request(format!("Invalid UUID: {}", err))
    }
}

// 从 anyhow 错误转换
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

impl From<crate::domain::DepositError> for AppError {
    fn from(err: crate::domain::DepositError) -> Self {
        use crate::domain::DepositError;
        match err {
            DepositError::Configuration(msg) => Self::configuration_error(msg),
            DepositError::Validation(msg) => Self::validation_failed(msg),
            DepositError::NotFound(msg) => Self::transaction_not_found(msg),
            DepositError::Verification(msg) => Self::verification_failed(msg),
            DepositError::BelowMinimum { minimum } => {
                Self::below_minimum_deposit(format!("deposit below minimum of {} LU", minimum))
            }
            DepositError::InsufficientBalance(msg) => Self::insufficient_balance(msg),
            DepositError::InsufficientFee(msg) => Self::insufficient_fee_balance(msg),
            DepositError::PriceUnavailable(msg) => Self::price_unavailable(msg),
            DepositError::External(msg) => Self::external_service_error(msg),
            DepositError::Sweep(msg) => Self::sweep_failed(msg),
            DepositError::Database(e) => e.into(),
        }
    }
}

//! 认证中间件
//!
//! 验证 Bearer Token（JWT签名 + 过期），提取 user_id 与 role
//! 注入请求扩展。管理端路由在此之上再叠加 role 检查。

use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

use crate::{api::middleware::trace_id::extract_trace_id, error::AppError, infrastructure::jwt};

/// 认证失败的响应也要带上trace_id，便于排查
fn tagged(err: AppError, trace_id: &Option<String>) -> AppError {
    match trace_id {
        Some(id) => err.with_trace_id(id.clone()),
        None => err,
    }
}

/// 认证信息（从Token中提取）
#[derive(Clone, Debug)]
pub struct AuthInfo {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthInfo {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

pub async fn auth_middleware(mut req: Request, next: Next) -> Result<Response, AppError> {
    // CORS 预检请求直接放行
    if req.method() == axum::http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let trace_id = extract_trace_id(&req);

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tagged(
                AppError::unauthorized("Authorization header required"),
                &trace_id,
            )
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| {
            tagged(
                AppError::unauthorized("Invalid authorization header format"),
                &trace_id,
            )
        })?
        .trim();

    let claims = jwt::verify_token(token).map_err(|e| {
        tagged(
            AppError::unauthorized(format!("Token verification failed: {}", e)),
            &trace_id,
        )
    })?;
    let user_id = claims
        .user_id()
        .map_err(|e| tagged(AppError::unauthorized(e.to_string()), &trace_id))?;

    req.extensions_mut().insert(AuthInfo {
        user_id,
        role: claims.role,
    });

    Ok(next.run(req).await)
}

/// 管理端角色检查，必须叠加在 auth_middleware 之后
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    if req.method() == axum::http::Method::OPTIONS {
        return Ok(next.run(req).await);
    }

    let trace_id = extract_trace_id(&req);

    let auth = req
        .extensions()
        .get::<AuthInfo>()
        .ok_or_else(|| tagged(AppError::unauthorized("Authentication required"), &trace_id))?;

    if !auth.is_admin() {
        return Err(tagged(AppError::forbidden("Admin role required"), &trace_id));
    }

    Ok(next.run(req).await)
}

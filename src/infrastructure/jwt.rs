//! JWT Token 生成和验证模块

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Subject (user ID)
    pub role: String, // "user" | "admin"
    pub exp: i64,     // Expiration time
    pub iat: i64,     // Issued at
    pub jti: String,  // JWT ID，保证每个token唯一
}

impl Claims {
    pub fn new(user_id: Uuid, role: String, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            role,
            exp: (now + Duration::seconds(expires_in_secs)).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// 获取用户 ID（UUID）
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).map_err(|e| anyhow!("Invalid user ID in claims: {}", e))
    }
}

/// 生成JWT Token
pub fn generate_token(user_id: Uuid, role: String) -> Result<String> {
    let expires_in_secs = std::env::var("JWT_TOKEN_EXPIRY_SECS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(3600);

    let secret = get_jwt_secret()?;
    let claims = Claims::new(user_id, role, expires_in_secs);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| anyhow!("Failed to encode token: {}", e))
}

/// 验证JWT Token
pub fn verify_token(token: &str) -> Result<Claims> {
    let secret = get_jwt_secret()?;

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 10; // 允许10秒时钟偏差

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| anyhow!("Token verification failed: {}", e))?;

    let claims = token_data.claims;
    Uuid::parse_str(&claims.sub).map_err(|e| anyhow!("Invalid user_id format in token: {}", e))?;

    Ok(claims)
}

fn get_jwt_secret() -> Result<String> {
    std::env::var("JWT_SECRET").map_err(|_| anyhow!("JWT_SECRET environment variable not set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_roundtrip() {
        std::env::set_var("JWT_SECRET", "test_secret_key_for_jwt_signing");

        let user_id = Uuid::new_v4();
        let token = generate_token(user_id, "admin".to_string()).unwrap();
        let claims = verify_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.user_id().unwrap(), user_id);
    }
}

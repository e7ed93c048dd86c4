use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;
use crate::AppState;

pub const ADMIN_ROLE: &str = "admin";

/// The authenticated operator, inserted into request extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminUser {
    pub subject: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: String,
}

/// Issues an HS256 admin token valid for `ttl`.
pub fn mint_token(secret: &str, subject: &str, ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = chrono::Utc::now().timestamp() as usize + ttl.as_secs() as usize;
    let claims = Claims {
        sub: subject.to_string(),
        exp,
        role: ADMIN_ROLE.to_string(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map_err(|e| {
            tracing::debug!("Auth | JWT rejected: {}", e);
            AppError::Unauthorized("Invalid or expired token".to_string())
        })?;
    if data.claims.role != ADMIN_ROLE {
        return Err(AppError::Unauthorized("Admin role required".to_string()));
    }
    Ok(data.claims)
}

pub async fn admin_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = verify_token(&state.config.admin_jwt_secret, token.trim())?;
    req.extensions_mut().insert(AdminUser { subject: claims.sub });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_tokens_verify_with_the_same_secret_only() {
        let token = mint_token("s3cret", "ops", Duration::from_secs(60)).unwrap();
        assert_eq!(verify_token("s3cret", &token).unwrap().sub, "ops");
        assert!(verify_token("other", &token).is_err());
    }

    #[test]
    fn non_admin_role_is_rejected() {
        let claims = Claims {
            sub: "viewer".into(),
            exp: chrono::Utc::now().timestamp() as usize + 60,
            role: "viewer".into(),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"k")).unwrap();
        assert!(verify_token("k", &token).is_err());
    }
}

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::{Admin, Student, UserType};
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_type: UserType,
    pub exp: i64,
}

/// Hashes off the async runtime, bcrypt is deliberately slow.
pub async fn hash_password(password: String, cost: u32) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

pub fn create_access_token(
    username: &str,
    user_type: UserType,
    secret: &str,
    expires_in: Duration,
) -> Result<String, ApiError> {
    let claims = Claims {
        sub: username.to_string(),
        user_type,
        exp: (Utc::now() + expires_in).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {}", e)))
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

/// Checks credentials for the given role, `false` on any mismatch.
pub async fn authenticate(
    state: &AppState,
    username: &str,
    password: &str,
    user_type: UserType,
) -> Result<bool, ApiError> {
    let hash = match user_type {
        UserType::Student => state
            .store
            .student_by_username(username)
            .await
            .map(|s| s.password_hash),
        UserType::Admin => state
            .store
            .admin_by_username(username)
            .await
            .map(|a| a.password_hash),
    };
    match hash {
        Some(hash) => verify_password(password.to_string(), hash).await,
        None => Ok(false),
    }
}

/// Token of an `Authorization` value, the scheme name matched case-insensitively.
pub fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim_start().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn bearer_claims(parts: &Parts, state: &AppState) -> Result<Claims, ApiError> {
    let token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized)?;
    decode_access_token(token, &state.settings.secret_key)
}

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Admin);

/// An authenticated student.
#[derive(Debug, Clone)]
pub struct StudentUser(pub Student);

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state)?;
        match claims.user_type {
            UserType::Admin => state
                .store
                .admin_by_username(&claims.sub)
                .await
                .map(AdminUser)
                .ok_or(ApiError::Unauthorized),
            UserType::Student => {
                // token is genuine, role is wrong
                state
                    .store
                    .student_by_username(&claims.sub)
                    .await
                    .ok_or(ApiError::Unauthorized)?;
                Err(ApiError::Forbidden("Not enough permissions"))
            }
        }
    }
}

impl FromRequestParts<Arc<AppState>> for StudentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state)?;
        match claims.user_type {
            UserType::Student => state
                .store
                .student_by_username(&claims.sub)
                .await
                .map(StudentUser)
                .ok_or(ApiError::Unauthorized),
            UserType::Admin => {
                state
                    .store
                    .admin_by_username(&claims.sub)
                    .await
                    .ok_or(ApiError::Unauthorized)?;
                Err(ApiError::Forbidden("Not a student account"))
            }
        }
    }
}

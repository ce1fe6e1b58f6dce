use std::time::Duration;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::Utc;
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{Role, User},
    state::AppState,
};

pub const ISSUER: &str = "kalika-backend";
pub const AUDIENCE: &str = "kalika-frontend";
pub const RESET_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

const SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

// --- passwords ---

pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::internal(format!("hash task failed: {e}")))?
        .map_err(|e| AppError::internal(format!("bcrypt: {e}")))
}

pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::internal(format!("verify task failed: {e}")))?
        .map_err(|e| AppError::internal(format!("bcrypt: {e}")))
}

/// Every strength rule the password breaks, in a fixed order.
pub fn password_problems(password: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    if password.chars().count() < 8 {
        problems.push("Password must be at least 8 characters long");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        problems.push("Password must contain at least one uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        problems.push("Password must contain at least one lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one number");
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        problems.push("Password must contain at least one special character");
    }
    problems
}

pub fn ensure_strong_password(password: &str) -> AppResult<()> {
    let problems = password_problems(password);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(AppError::bad_request(format!(
            "Password validation failed: {}",
            problems.join(", ")
        )))
    }
}

// --- tokens ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
    Reset,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("wrong token kind")]
    WrongKind,
}

pub struct TokenKeys {
    access_enc: EncodingKey,
    access_dec: DecodingKey,
    refresh_enc: EncodingKey,
    refresh_dec: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenKeys {
    pub fn new(config: &Config) -> Self {
        Self {
            access_enc: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_dec: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            refresh_enc: EncodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
            refresh_dec: DecodingKey::from_secret(config.jwt_refresh_secret.as_bytes()),
            access_ttl: config.jwt_expires_in,
            refresh_ttl: config.jwt_refresh_expires_in,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access(&self, user: &User) -> AppResult<String> {
        let mut claims = claims_for(user.id, TokenKind::Access, self.access_ttl);
        claims.email = Some(user.email.clone());
        claims.role = Some(user.role.clone());
        claims.name = Some(user.name.clone());
        self.sign(&claims)
    }

    pub fn issue_refresh(&self, user_id: Uuid) -> AppResult<String> {
        self.sign(&claims_for(user_id, TokenKind::Refresh, self.refresh_ttl))
    }

    pub fn issue_reset(&self, user_id: Uuid) -> AppResult<String> {
        self.sign(&claims_for(user_id, TokenKind::Reset, RESET_TOKEN_TTL))
    }

    fn sign(&self, claims: &Claims) -> AppResult<String> {
        let key = match claims.kind {
            TokenKind::Access => &self.access_enc,
            TokenKind::Refresh | TokenKind::Reset => &self.refresh_enc,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, key)
            .map_err(|e| AppError::internal(format!("jwt encode: {e}")))
    }

    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let key = match kind {
            TokenKind::Access => &self.access_dec,
            TokenKind::Refresh | TokenKind::Reset => &self.refresh_dec,
        };
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);

        let data = jsonwebtoken::decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })?;
        if data.claims.kind != kind {
            return Err(TokenError::WrongKind);
        }
        Ok(data.claims)
    }
}

fn claims_for(sub: Uuid, kind: TokenKind, ttl: Duration) -> Claims {
    let now = Utc::now().timestamp();
    Claims {
        sub,
        kind,
        email: None,
        role: None,
        name: None,
        jti: Uuid::new_v4(),
        iat: now,
        exp: now + ttl.as_secs() as i64,
        iss: ISSUER.into(),
        aud: AUDIENCE.into(),
    }
}

// --- extractors ---

/// The active user behind a valid `Authorization: Bearer` access token.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized("Access token required"))?;

        let claims = state
            .tokens
            .verify(bearer.token(), TokenKind::Access)
            .map_err(|e| match e {
                TokenError::Expired => AppError::unauthorized("Token expired"),
                _ => AppError::unauthorized("Invalid token"),
            })?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND active = true")
            .bind(claims.sub)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::unauthorized("User no longer exists"))?;

        Ok(Self(user))
    }
}

/// An [`AuthUser`] with the admin role.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        require_role(&user, &[Role::Admin]).map_err(|_| AppError::forbidden("Admin access required"))?;
        Ok(Self(user))
    }
}

pub fn require_role(user: &User, roles: &[Role]) -> AppResult<()> {
    if roles.iter().any(|r| r.as_str() == user.role) {
        return Ok(());
    }
    tracing::warn!(user_id = %user.id, role = %user.role, "unauthorized role access attempt");
    let names: Vec<&str> = roles.iter().map(|r| r.as_str()).collect();
    Err(AppError::forbidden(format!(
        "Access denied. Required roles: {}",
        names.join(", ")
    )))
}

#[cfg(test)]
pub(crate) fn test_user(role: Role) -> User {
    let now = Utc::now();
    User {
        id: Uuid::new_v4(),
        name: "Asha Rao".into(),
        email: "asha@example.com".into(),
        password_hash: String::new(),
        class: "SSLC".into(),
        role: role.as_str().into(),
        active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    }
}

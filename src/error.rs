use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, please try again later")]
    TooManyRequests { retry_after: u64 },

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    ServiceUnavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// Status, client-facing message and optional SQLSTATE.
    fn parts(&self) -> (StatusCode, String, Option<String>) {
        match self {
            Self::BadRequest(_) | Self::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string(), None),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, self.to_string(), None),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string(), None),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string(), None),
            Self::Conflict(_) => (StatusCode::CONFLICT, self.to_string(), None),
            Self::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, self.to_string(), None),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, self.to_string(), None),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string(), None),
            Self::Database(e) => classify_db_error(e),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".into(), None),
        }
    }
}

fn classify_db_error(e: &sqlx::Error) -> (StatusCode, String, Option<String>) {
    match e {
        sqlx::Error::RowNotFound => (StatusCode::NOT_FOUND, "Resource not found".into(), None),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.into_owned());
            let (status, msg) = match code.as_deref() {
                Some("23505") => (StatusCode::CONFLICT, "Resource already exists"),
                Some("23503") => (StatusCode::BAD_REQUEST, "Referenced resource does not exist"),
                Some("42P01") => (StatusCode::INTERNAL_SERVER_ERROR, "Database configuration error"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            };
            (status, msg.into(), code)
        }
        sqlx::Error::PoolTimedOut => (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable".into(), None),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".into(), None),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = self.parts();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let mut error = json!({ "message": message, "statusCode": status.as_u16() });
        if let Some(code) = code {
            error["code"] = json!(code);
        }
        let body = json!({
            "success": false,
            "error": error,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut res = (status, Json(body)).into_response();
        if let Self::TooManyRequests { retry_after } = self {
            if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
                res.headers_mut().insert(header::RETRY_AFTER, v);
            }
        }
        res
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(r: JsonRejection) -> Self {
        Self::BadRequest(r.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(r: QueryRejection) -> Self {
        Self::BadRequest(r.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(_: PathRejection) -> Self {
        Self::BadRequest("Invalid ID format".into())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        Self::BadRequest(e.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.into())
    }
}

pub async fn not_found(method: Method, uri: Uri) -> AppError {
    tracing::warn!(%method, %uri, "route not found");
    AppError::not_found("Route not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_variants_to_status() {
        let cases = [
            (AppError::bad_request("x"), StatusCode::BAD_REQUEST),
            (AppError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (AppError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (AppError::forbidden("x"), StatusCode::FORBIDDEN),
            (AppError::not_found("x"), StatusCode::NOT_FOUND),
            (AppError::conflict("x"), StatusCode::CONFLICT),
            (AppError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (AppError::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Database(sqlx::Error::RowNotFound), StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn internal_details_are_hidden() {
        let (_, message, _) = AppError::internal("connection string leaked").parts();
        assert_eq!(message, "Internal Server Error");
    }

    #[tokio::test]
    async fn error_body_uses_envelope() {
        let res = AppError::conflict("User with this email already exists").into_response();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["statusCode"], 409);
        assert_eq!(body["error"]["message"], "User with this email already exists");
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let res = AppError::TooManyRequests { retry_after: 42 }.into_response();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers()[header::RETRY_AFTER], "42");
    }
}

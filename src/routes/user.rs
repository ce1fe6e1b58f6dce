use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::AppQuery,
    models::{EmailQuery, User},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/profile", get(profile_by_email))
}

async fn profile_by_email(
    State(state): State<AppState>,
    AppQuery(q): AppQuery<EmailQuery>,
) -> AppResult<Json<Value>> {
    let email = q.email.ok_or_else(|| AppError::bad_request("Missing email"))?;
    let user: User = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    let picture: Option<String> = sqlx::query_scalar(
        "SELECT image_url FROM profile_pictures WHERE user_id = $1 ORDER BY uploaded_at DESC LIMIT 1",
    )
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?;

    Ok(Json(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "class": user.class,
        "profile_picture": picture,
    })))
}

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::{AppQuery, ValidJson},
    models::{Progress, ProgressUpdateReq, UserIdQuery},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list).put(upsert))
}

async fn list(State(state): State<AppState>, AppQuery(q): AppQuery<UserIdQuery>) -> AppResult<Json<Value>> {
    let user_id = q.user_id.ok_or_else(|| AppError::bad_request("Missing user_id"))?;
    let progress: Vec<Progress> =
        sqlx::query_as("SELECT * FROM student_progress WHERE user_id = $1 ORDER BY subject, chapter")
            .bind(user_id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(json!({ "progress": progress })))
}

async fn upsert(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidJson(req): ValidJson<ProgressUpdateReq>,
) -> AppResult<Json<Value>> {
    let (percent, points) = req.clamped();
    let progress: Progress = sqlx::query_as(
        "INSERT INTO student_progress (id, user_id, subject, chapter, progress_percent, points) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (user_id, subject, chapter) DO UPDATE \
         SET progress_percent = EXCLUDED.progress_percent, points = EXCLUDED.points, last_updated = now() \
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(&req.subject)
    .bind(&req.chapter)
    .bind(percent)
    .bind(points)
    .fetch_one(&state.db)
    .await?;

    tracing::debug!(user_id = %user.id, subject = %req.subject, chapter = %req.chapter, percent, "progress saved");
    Ok(Json(json!({ "success": true, "progress": progress })))
}

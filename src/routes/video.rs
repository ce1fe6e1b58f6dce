use std::path::Path;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::{types::Json as Jsonb, Postgres, QueryBuilder};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use super::{created, direction, ok, ok_msg, sort_column};
use crate::{
    auth::AdminUser,
    db::Db,
    error::{AppError, AppResult},
    extract::{AppPath, AppQuery, ValidJson},
    models::{Bucket, ListQuery, Video, VideoOverview, VideoReq},
    state::AppState,
    upload::{self, StoredFile, UploadRules, VIDEO_MAX_BYTES, VIDEO_MIME_TYPES},
};

const SORT_COLUMNS: &[&str] = &[
    "title",
    "subject",
    "chapter",
    "difficulty_level",
    "duration_minutes",
    "view_count",
    "file_size",
    "created_at",
    "updated_at",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route(
            "/upload",
            post(upload_video).layer(DefaultBodyLimit::max(VIDEO_MAX_BYTES + 1024 * 1024)),
        )
        .route("/stats/overview", get(stats))
        .route("/:id", get(get_one).put(update).delete(remove))
        .route("/:id/stream", get(stream))
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, q: &ListQuery) {
    if let Some(subject) = &q.subject {
        qb.push(" AND subject = ").push_bind(subject.clone());
    }
    if let Some(chapter) = &q.chapter {
        qb.push(" AND chapter = ").push_bind(chapter.clone());
    }
    if let Some(level) = &q.difficulty_level {
        qb.push(" AND difficulty_level = ").push_bind(level.clone());
    }
    if let Some(active) = q.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
    if let Some(search) = &q.search {
        let pattern = format!("%{search}%");
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR topic ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

async fn insert(db: &Db, req: &VideoReq, file: &StoredFile) -> Result<Video, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO videos (id, title, description, subject, chapter, topic, difficulty_level, duration_minutes, \
         tags, thumbnail_url, transcript, subtitles, file_path, file_name, file_size, mime_type, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.title)
    .bind(req.description.as_deref().unwrap_or_default())
    .bind(&req.subject)
    .bind(&req.chapter)
    .bind(req.topic.as_deref().unwrap_or_default())
    .bind(req.difficulty_level.as_str())
    .bind(req.duration_minutes)
    .bind(Jsonb(&req.tags))
    .bind(req.thumbnail_url.as_deref())
    .bind(req.transcript.as_deref().unwrap_or_default())
    .bind(Jsonb(&req.subtitles))
    .bind(&file.path)
    .bind(&file.file_name)
    .bind(file.size)
    .bind(&file.mime_type)
    .bind(req.is_active)
    .fetch_one(db)
    .await
}

async fn list(State(state): State<AppState>, AppQuery(q): AppQuery<ListQuery>) -> AppResult<Json<Value>> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM videos WHERE TRUE");
    push_filters(&mut count, &q);
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;
    let page = q.pagination(20, total);

    let mut qb = QueryBuilder::new("SELECT * FROM videos WHERE TRUE");
    push_filters(&mut qb, &q);
    let column = sort_column(q.sort_by.as_deref(), SORT_COLUMNS).unwrap_or("created_at");
    qb.push(format!(" ORDER BY {column} {}", direction(q.descending(true))));
    qb.push(" LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.offset());
    let rows: Vec<Video> = qb.build_query_as().fetch_all(&state.db).await?;

    Ok(Json(json!({ "success": true, "data": rows, "pagination": page })))
}

async fn get_one(State(state): State<AppState>, AppPath(id): AppPath<Uuid>) -> AppResult<Json<Value>> {
    let video: Video = sqlx::query_as("UPDATE videos SET view_count = view_count + 1 WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Video not found"))?;
    Ok(ok(video))
}

async fn upload_video(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let rules = UploadRules {
        dir: Path::new(&state.config.upload_dir).join("videos"),
        max_bytes: VIDEO_MAX_BYTES,
        allowed: VIDEO_MIME_TYPES,
    };
    let form = upload::read_form(&mut multipart, "video", &rules).await?;
    let file = form.file.ok_or_else(|| AppError::bad_request("No video file uploaded"))?;

    let result = match upload::parse_form::<VideoReq>(form.fields) {
        Ok(req) => insert(&state.db, &req, &file).await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    let video = match result {
        Ok(video) => video,
        Err(e) => {
            upload::remove_file(&file.path).await;
            return Err(e);
        }
    };

    tracing::info!(admin_id = %admin.id, video_id = %video.id, size = file.size, "video uploaded");
    Ok(created("Video uploaded successfully", video))
}

async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
    ValidJson(req): ValidJson<VideoReq>,
) -> AppResult<Json<Value>> {
    let video: Video = sqlx::query_as(
        "UPDATE videos SET title = $1, description = $2, subject = $3, chapter = $4, topic = $5, \
         difficulty_level = $6, duration_minutes = $7, tags = $8, \
         thumbnail_url = COALESCE($9, thumbnail_url), transcript = COALESCE($10, transcript), \
         subtitles = $11, is_active = $12, updated_at = now() WHERE id = $13 RETURNING *",
    )
    .bind(&req.title)
    .bind(req.description.as_deref().unwrap_or_default())
    .bind(&req.subject)
    .bind(&req.chapter)
    .bind(req.topic.as_deref().unwrap_or_default())
    .bind(req.difficulty_level.as_str())
    .bind(req.duration_minutes)
    .bind(Jsonb(&req.tags))
    .bind(req.thumbnail_url.as_deref())
    .bind(req.transcript.as_deref())
    .bind(Jsonb(&req.subtitles))
    .bind(req.is_active)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Video not found"))?;

    tracing::info!(admin_id = %admin.id, video_id = %id, "video updated");
    Ok(ok_msg("Video updated successfully", video))
}

async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let video: Video = sqlx::query_as("DELETE FROM videos WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Video not found"))?;

    upload::remove_file(&video.file_path).await;
    tracing::info!(admin_id = %admin.id, video_id = %id, "video deleted");
    Ok(ok_msg("Video deleted successfully", video))
}

/// Serves the stored file; `Range` requests get 206 partial content.
async fn stream(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    req: Request,
) -> AppResult<Response> {
    let (path, mime_type): (String, String) =
        sqlx::query_as("SELECT file_path, mime_type FROM videos WHERE id = $1 AND is_active = true")
            .bind(id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::not_found("Video not found"))?;

    if tokio::fs::metadata(&path).await.is_err() {
        tracing::warn!(video_id = %id, %path, "video file missing on disk");
        return Err(AppError::not_found("Video file not found"));
    }

    let res = match ServeFile::new(&path).oneshot(req).await {
        Ok(res) => res,
        Err(never) => match never {},
    };
    let mut res = res.map(Body::new);
    if res.status().is_success() {
        if let Ok(value) = HeaderValue::from_str(&mime_type) {
            res.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }
    Ok(res.into_response())
}

async fn stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let overview: VideoOverview = sqlx::query_as(
        "SELECT COUNT(*) AS total_videos, COALESCE(SUM(view_count), 0)::bigint AS total_views, \
         COALESCE(SUM(file_size), 0)::bigint AS total_size_bytes, \
         COALESCE(AVG(duration_minutes), 0)::float8 AS avg_duration_minutes \
         FROM videos WHERE is_active = true",
    )
    .fetch_one(&state.db)
    .await?;

    let by_difficulty: Vec<Bucket> = sqlx::query_as(
        "SELECT difficulty_level AS name, COUNT(*) AS count FROM videos WHERE is_active = true \
         GROUP BY difficulty_level ORDER BY count DESC",
    )
    .fetch_all(&state.db)
    .await?;

    let popular: Vec<Video> =
        sqlx::query_as("SELECT * FROM videos WHERE is_active = true ORDER BY view_count DESC, title LIMIT 10")
            .fetch_all(&state.db)
            .await?;

    Ok(ok(json!({
        "overview": overview,
        "difficulty_distribution": by_difficulty,
        "popular_videos": popular,
    })))
}

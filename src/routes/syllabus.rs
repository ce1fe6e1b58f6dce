use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::{types::Json as Jsonb, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{created, direction, ok, ok_msg, sort_column};
use crate::{
    auth::AdminUser,
    error::{AppError, AppResult},
    extract::{AppPath, AppQuery, ValidJson},
    models::{
        Bucket, BulkSyllabusReq, ClassBucket, LimitQuery, ListQuery, Pagination, SyllabusEntry, SyllabusOverview,
        SyllabusReq,
    },
    state::AppState,
    syllabus::{group_by_class_subject, replace_class},
};

const SORT_COLUMNS: &[&str] = &[
    "class",
    "subject",
    "chapter_name",
    "chapter_number",
    "duration_hours",
    "difficulty_level",
    "created_at",
    "updated_at",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/bulk", post(bulk_upload))
        .route("/upload", post(bulk_upload))
        .route("/stats/overview", get(stats))
        .route("/search/:query", get(search))
        .route("/:id", get(get_one).put(update).delete(remove))
        .route("/:id/toggle", patch(toggle))
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, q: &ListQuery) {
    if let Some(class) = &q.class {
        qb.push(" AND class = ").push_bind(class.clone());
    }
    if let Some(subject) = &q.subject {
        qb.push(" AND subject = ").push_bind(subject.clone());
    }
    if let Some(level) = &q.difficulty_level {
        qb.push(" AND difficulty_level = ").push_bind(level.clone());
    }
    if let Some(active) = q.is_active {
        qb.push(" AND is_active = ").push_bind(active);
    }
    if let Some(search) = &q.search {
        let pattern = format!("%{search}%");
        qb.push(" AND (chapter_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR subject ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

async fn list(State(state): State<AppState>, AppQuery(q): AppQuery<ListQuery>) -> AppResult<Json<Value>> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM syllabus WHERE TRUE");
    push_filters(&mut count, &q);
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;
    let page = if q.is_paged() { q.pagination(50, total) } else { Pagination::whole(total) };

    let mut qb = QueryBuilder::new("SELECT * FROM syllabus WHERE TRUE");
    push_filters(&mut qb, &q);
    match sort_column(q.sort_by.as_deref(), SORT_COLUMNS) {
        Some(column) => {
            qb.push(format!(" ORDER BY {column} {}, subject, chapter_number", direction(q.descending(false))));
        }
        None => {
            qb.push(" ORDER BY class, subject, chapter_number");
        }
    }
    if q.is_paged() {
        qb.push(" LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.offset());
    }
    let rows: Vec<SyllabusEntry> = qb.build_query_as().fetch_all(&state.db).await?;
    let grouped = group_by_class_subject(rows);

    Ok(Json(json!({
        "success": true,
        "syllabus": grouped,
        "data": grouped,
        "pagination": page,
    })))
}

async fn get_one(State(state): State<AppState>, AppPath(id): AppPath<Uuid>) -> AppResult<Json<Value>> {
    let entry: SyllabusEntry = sqlx::query_as("SELECT * FROM syllabus WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Syllabus not found"))?;
    Ok(ok(entry))
}

async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(req): ValidJson<SyllabusReq>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let entry: SyllabusEntry = sqlx::query_as(
        "INSERT INTO syllabus (id, class, subject, chapter_name, chapter_number, topics, learning_objectives, \
         duration_hours, difficulty_level, prerequisites, tags, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.class)
    .bind(&req.subject)
    .bind(&req.chapter_name)
    .bind(req.chapter_number)
    .bind(Jsonb(&req.topics))
    .bind(Jsonb(&req.learning_objectives))
    .bind(req.duration_hours)
    .bind(req.difficulty_level.as_str())
    .bind(Jsonb(&req.prerequisites))
    .bind(Jsonb(&req.tags))
    .bind(req.is_active)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(admin_id = %admin.id, syllabus_id = %entry.id, class = %entry.class, "syllabus entry created");
    Ok(created("Syllabus entry created successfully", entry))
}

async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
    ValidJson(req): ValidJson<SyllabusReq>,
) -> AppResult<Json<Value>> {
    let entry: SyllabusEntry = sqlx::query_as(
        "UPDATE syllabus SET class = $1, subject = $2, chapter_name = $3, chapter_number = $4, topics = $5, \
         learning_objectives = $6, duration_hours = $7, difficulty_level = $8, prerequisites = $9, tags = $10, \
         is_active = $11, updated_at = now() WHERE id = $12 RETURNING *",
    )
    .bind(&req.class)
    .bind(&req.subject)
    .bind(&req.chapter_name)
    .bind(req.chapter_number)
    .bind(Jsonb(&req.topics))
    .bind(Jsonb(&req.learning_objectives))
    .bind(req.duration_hours)
    .bind(req.difficulty_level.as_str())
    .bind(Jsonb(&req.prerequisites))
    .bind(Jsonb(&req.tags))
    .bind(req.is_active)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Syllabus not found"))?;

    tracing::info!(admin_id = %admin.id, syllabus_id = %id, "syllabus entry updated");
    Ok(ok_msg("Syllabus updated successfully", entry))
}

async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let entry: SyllabusEntry = sqlx::query_as("DELETE FROM syllabus WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Syllabus not found"))?;

    tracing::info!(admin_id = %admin.id, syllabus_id = %id, "syllabus entry deleted");
    Ok(ok_msg("Syllabus deleted successfully", entry))
}

async fn toggle(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let entry: SyllabusEntry = sqlx::query_as(
        "UPDATE syllabus SET is_active = NOT is_active, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Syllabus not found"))?;

    let status = if entry.is_active { "activated" } else { "deactivated" };
    tracing::info!(admin_id = %admin.id, syllabus_id = %id, status, "syllabus entry toggled");
    Ok(ok_msg(format!("Syllabus {status} successfully"), entry))
}

async fn bulk_upload(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(req): ValidJson<BulkSyllabusReq>,
) -> AppResult<Json<Value>> {
    let mut tx = state.db.begin().await?;
    let removed = replace_class(&mut tx, &req).await?;
    tx.commit().await?;

    let total_chapters = req.total_chapters();
    tracing::info!(
        admin_id = %admin.id,
        class = %req.class,
        removed,
        inserted = total_chapters,
        "syllabus replaced for class"
    );
    Ok(ok_msg(
        format!("Syllabus uploaded for {}", req.class),
        json!({
            "class": req.class,
            "subjects_count": req.subjects.len(),
            "total_chapters": total_chapters,
        }),
    ))
}

async fn stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let overview: SyllabusOverview = sqlx::query_as(
        "SELECT COUNT(*) AS total_chapters, COUNT(DISTINCT class) AS total_classes, \
         COUNT(DISTINCT subject) AS total_subjects, \
         COALESCE(AVG(duration_hours), 0)::float8 AS avg_duration_hours, \
         COALESCE(SUM(duration_hours), 0)::bigint AS total_duration_hours \
         FROM syllabus WHERE is_active = true",
    )
    .fetch_one(&state.db)
    .await?;

    let difficulty: Vec<Bucket> = sqlx::query_as(
        "SELECT difficulty_level AS name, COUNT(*) AS count FROM syllabus WHERE is_active = true \
         GROUP BY difficulty_level ORDER BY count DESC",
    )
    .fetch_all(&state.db)
    .await?;

    let classes: Vec<ClassBucket> = sqlx::query_as(
        "SELECT class, COUNT(*) AS chapters, COUNT(DISTINCT subject) AS subjects FROM syllabus \
         WHERE is_active = true GROUP BY class ORDER BY class",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ok(json!({
        "overview": overview,
        "difficulty_distribution": difficulty,
        "class_distribution": classes,
    })))
}

async fn search(
    State(state): State<AppState>,
    AppPath(query): AppPath<String>,
    AppQuery(q): AppQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let pattern = format!("%{query}%");
    let rows: Vec<SyllabusEntry> = sqlx::query_as(
        "SELECT * FROM syllabus WHERE is_active = true AND (chapter_name ILIKE $1 OR subject ILIKE $1 \
         OR class ILIKE $1 OR topics::text ILIKE $1 OR learning_objectives::text ILIKE $1) \
         ORDER BY CASE WHEN chapter_name ILIKE $1 THEN 1 WHEN subject ILIKE $1 THEN 2 ELSE 3 END, chapter_number \
         LIMIT $2",
    )
    .bind(&pattern)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": rows,
        "query": query,
        "count": rows.len(),
    })))
}

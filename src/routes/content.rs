use std::{collections::BTreeMap, path::Path};

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
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
    db::Db,
    error::{AppError, AppResult},
    extract::{AppPath, AppQuery, ValidJson},
    generate::{generate_content, ContentPlan},
    models::{
        Bucket, BulkContentReq, ContentGenerateReq, ContentOverview, ContentReq, DifficultyLevel, LimitQuery, ListQuery,
        StudyContent,
    },
    state::AppState,
    syllabus::load_context,
    upload::{self, StoredFile, UploadRules, CONTENT_MAX_BYTES, CONTENT_MIME_TYPES},
};

const SORT_COLUMNS: &[&str] = &[
    "title",
    "subject",
    "chapter",
    "content_type",
    "difficulty_level",
    "duration_minutes",
    "view_count",
    "created_at",
    "updated_at",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(CONTENT_MAX_BYTES + 1024 * 1024)),
        )
        .route("/bulk", post(bulk_create))
        .route("/generate", post(generate))
        .route("/subject/:subject/chapter/:chapter", get(by_chapter))
        .route("/search/:query", get(search))
        .route("/stats/overview", get(stats))
        .route("/:id", get(get_one).put(update).delete(remove))
        .route("/:id/toggle", patch(toggle))
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, q: &ListQuery) {
    if let Some(subject) = &q.subject {
        qb.push(" AND subject = ").push_bind(subject.clone());
    }
    if let Some(chapter) = &q.chapter {
        qb.push(" AND chapter = ").push_bind(chapter.clone());
    }
    if let Some(kind) = &q.content_type {
        qb.push(" AND content_type = ").push_bind(kind.clone());
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
            .push_bind(pattern)
            .push(")");
    }
}

/// Rows keyed by `content_type`, each list in query order.
fn group_by_type(rows: Vec<StudyContent>) -> BTreeMap<String, Vec<StudyContent>> {
    let mut grouped: BTreeMap<String, Vec<StudyContent>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.content_type.clone()).or_default().push(row);
    }
    grouped
}

async fn insert(db: &Db, req: &ContentReq, file: Option<&StoredFile>) -> Result<StudyContent, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO study_content (id, title, description, subject, chapter, topic, content_type, \
         difficulty_level, duration_minutes, tags, prerequisites, learning_objectives, content_data, metadata, \
         is_active, file_path, file_name, file_size, mime_type) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&req.title)
    .bind(req.description.as_deref().unwrap_or_default())
    .bind(&req.subject)
    .bind(&req.chapter)
    .bind(req.topic.as_deref().unwrap_or_default())
    .bind(req.content_type.as_str())
    .bind(req.difficulty_level.as_str())
    .bind(req.duration_minutes.unwrap_or(15))
    .bind(Jsonb(&req.tags))
    .bind(Jsonb(&req.prerequisites))
    .bind(Jsonb(&req.learning_objectives))
    .bind(Jsonb(req.content_data.clone().unwrap_or_else(|| json!({}))))
    .bind(Jsonb(req.metadata.clone().unwrap_or_else(|| json!({}))))
    .bind(req.is_active)
    .bind(file.map(|f| f.path.clone()))
    .bind(file.map(|f| f.file_name.clone()))
    .bind(file.map(|f| f.size))
    .bind(file.map(|f| f.mime_type.clone()))
    .fetch_one(db)
    .await
}

async fn list(State(state): State<AppState>, AppQuery(q): AppQuery<ListQuery>) -> AppResult<Json<Value>> {
    let mut count = QueryBuilder::new("SELECT COUNT(*) FROM study_content WHERE TRUE");
    push_filters(&mut count, &q);
    let total: i64 = count.build_query_scalar().fetch_one(&state.db).await?;
    let page = q.pagination(20, total);

    let mut qb = QueryBuilder::new("SELECT * FROM study_content WHERE TRUE");
    push_filters(&mut qb, &q);
    let column = sort_column(q.sort_by.as_deref(), SORT_COLUMNS).unwrap_or("created_at");
    qb.push(format!(" ORDER BY {column} {}", direction(q.descending(true))));
    qb.push(" LIMIT ").push_bind(page.limit).push(" OFFSET ").push_bind(page.offset());
    let rows: Vec<StudyContent> = qb.build_query_as().fetch_all(&state.db).await?;

    Ok(Json(json!({ "success": true, "data": rows, "pagination": page })))
}

async fn get_one(State(state): State<AppState>, AppPath(id): AppPath<Uuid>) -> AppResult<Json<Value>> {
    let content: StudyContent =
        sqlx::query_as("UPDATE study_content SET view_count = view_count + 1 WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::not_found("Content not found"))?;
    Ok(ok(content))
}

async fn create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(req): ValidJson<ContentReq>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let content = insert(&state.db, &req, None).await?;
    tracing::info!(admin_id = %admin.id, content_id = %content.id, "content created");
    Ok(created("Content created successfully", content))
}

async fn upload_file(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Value>)> {
    let rules = UploadRules {
        dir: Path::new(&state.config.upload_dir).join("content"),
        max_bytes: CONTENT_MAX_BYTES,
        allowed: CONTENT_MIME_TYPES,
    };
    let form = upload::read_form(&mut multipart, "file", &rules).await?;
    let file = form.file.ok_or_else(|| AppError::bad_request("No file uploaded"))?;

    let result = match upload::parse_form::<ContentReq>(form.fields) {
        Ok(req) => insert(&state.db, &req, Some(&file)).await.map_err(AppError::from),
        Err(e) => Err(e),
    };
    let content = match result {
        Ok(content) => content,
        Err(e) => {
            upload::remove_file(&file.path).await;
            return Err(e);
        }
    };

    tracing::info!(admin_id = %admin.id, content_id = %content.id, size = file.size, "content file uploaded");
    Ok(created("Content file uploaded successfully", content))
}

async fn update(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
    ValidJson(req): ValidJson<ContentReq>,
) -> AppResult<Json<Value>> {
    let content: StudyContent = sqlx::query_as(
        "UPDATE study_content SET title = $1, description = $2, subject = $3, chapter = $4, topic = $5, \
         content_type = $6, difficulty_level = $7, duration_minutes = $8, tags = $9, prerequisites = $10, \
         learning_objectives = $11, content_data = COALESCE($12, content_data), \
         metadata = COALESCE($13, metadata), is_active = $14, updated_at = now() \
         WHERE id = $15 RETURNING *",
    )
    .bind(&req.title)
    .bind(req.description.as_deref().unwrap_or_default())
    .bind(&req.subject)
    .bind(&req.chapter)
    .bind(req.topic.as_deref().unwrap_or_default())
    .bind(req.content_type.as_str())
    .bind(req.difficulty_level.as_str())
    .bind(req.duration_minutes.unwrap_or(15))
    .bind(Jsonb(&req.tags))
    .bind(Jsonb(&req.prerequisites))
    .bind(Jsonb(&req.learning_objectives))
    .bind(req.content_data.as_ref().map(Jsonb))
    .bind(req.metadata.as_ref().map(Jsonb))
    .bind(req.is_active)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Content not found"))?;

    tracing::info!(admin_id = %admin.id, content_id = %id, "content updated");
    Ok(ok_msg("Content updated successfully", content))
}

async fn remove(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let content: StudyContent = sqlx::query_as("DELETE FROM study_content WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Content not found"))?;

    if let Some(path) = &content.file_path {
        upload::remove_file(path).await;
    }
    tracing::info!(admin_id = %admin.id, content_id = %id, "content deleted");
    Ok(ok_msg("Content deleted successfully", content))
}

async fn toggle(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<Value>> {
    let content: StudyContent = sqlx::query_as(
        "UPDATE study_content SET is_active = NOT is_active, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Content not found"))?;

    let status = if content.is_active { "activated" } else { "deactivated" };
    tracing::info!(admin_id = %admin.id, content_id = %id, status, "content toggled");
    Ok(ok_msg(format!("Content {status} successfully"), content))
}

async fn bulk_create(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidJson(req): ValidJson<BulkContentReq>,
) -> AppResult<Json<Value>> {
    let mut tx = state.db.begin().await?;
    let mut contents = Vec::with_capacity(req.contents.len());
    for item in &req.contents {
        let row: StudyContent = sqlx::query_as(
            "INSERT INTO study_content (id, title, description, subject, chapter, topic, content_type, \
             difficulty_level, duration_minutes, tags, content_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&item.title)
        .bind(item.description.as_deref().unwrap_or_default())
        .bind(&req.subject)
        .bind(&req.chapter)
        .bind(item.topic.as_deref().unwrap_or_default())
        .bind(item.content_type.as_str())
        .bind(item.difficulty_level.as_str())
        .bind(item.duration_minutes)
        .bind(Jsonb(&item.tags))
        .bind(Jsonb(item.content_data.clone().unwrap_or_else(|| json!({}))))
        .fetch_one(&mut *tx)
        .await?;
        contents.push(row);
    }
    tx.commit().await?;

    tracing::info!(admin_id = %admin.id, subject = %req.subject, chapter = %req.chapter, count = contents.len(), "bulk content created");
    Ok(ok_msg(
        format!("Bulk content upload completed for {} - {}", req.subject, req.chapter),
        json!({
            "subject": req.subject,
            "chapter": req.chapter,
            "contents_count": contents.len(),
            "contents": contents,
        }),
    ))
}

async fn by_chapter(
    State(state): State<AppState>,
    AppPath((subject, chapter)): AppPath<(String, String)>,
    AppQuery(q): AppQuery<ListQuery>,
) -> AppResult<Json<Value>> {
    let rows: Vec<StudyContent> = sqlx::query_as(
        "SELECT * FROM study_content WHERE subject = $1 AND chapter = $2 \
         AND ($3::text IS NULL OR content_type = $3) AND ($4::text IS NULL OR difficulty_level = $4) \
         AND is_active = $5 ORDER BY content_type, difficulty_level, title",
    )
    .bind(&subject)
    .bind(&chapter)
    .bind(q.content_type.as_deref())
    .bind(q.difficulty_level.as_deref())
    .bind(q.is_active.unwrap_or(true))
    .fetch_all(&state.db)
    .await?;

    let total_count = rows.len();
    Ok(ok(json!({
        "subject": subject,
        "chapter": chapter,
        "content": group_by_type(rows),
        "total_count": total_count,
    })))
}

async fn search(
    State(state): State<AppState>,
    AppPath(query): AppPath<String>,
    AppQuery(q): AppQuery<LimitQuery>,
) -> AppResult<Json<Value>> {
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let rows: Vec<StudyContent> = sqlx::query_as(
        "SELECT * FROM study_content WHERE is_active = true \
         AND (title ILIKE $1 OR description ILIKE $1 OR subject ILIKE $1 OR chapter ILIKE $1 \
         OR topic ILIKE $1 OR tags::text ILIKE $1) \
         AND ($2::text IS NULL OR content_type = $2) AND ($3::text IS NULL OR difficulty_level = $3) \
         ORDER BY CASE WHEN title ILIKE $1 THEN 1 WHEN subject ILIKE $1 THEN 2 WHEN chapter ILIKE $1 THEN 3 ELSE 4 END, \
         title LIMIT $4",
    )
    .bind(format!("%{query}%"))
    .bind(q.content_type.as_deref())
    .bind(q.difficulty_level.as_deref())
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

async fn stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let overview: ContentOverview = sqlx::query_as(
        "SELECT COUNT(*) AS total_content, COALESCE(SUM(view_count), 0)::bigint AS total_views, \
         COALESCE(AVG(duration_minutes), 0)::float8 AS avg_duration_minutes, \
         COUNT(DISTINCT subject) AS total_subjects, COUNT(DISTINCT chapter) AS total_chapters \
         FROM study_content WHERE is_active = true",
    )
    .fetch_one(&state.db)
    .await?;

    let by_type: Vec<Bucket> = sqlx::query_as(
        "SELECT content_type AS name, COUNT(*) AS count FROM study_content WHERE is_active = true \
         GROUP BY content_type ORDER BY count DESC",
    )
    .fetch_all(&state.db)
    .await?;

    let by_difficulty: Vec<Bucket> = sqlx::query_as(
        "SELECT difficulty_level AS name, COUNT(*) AS count FROM study_content WHERE is_active = true \
         GROUP BY difficulty_level ORDER BY count DESC",
    )
    .fetch_all(&state.db)
    .await?;

    let popular: Vec<StudyContent> = sqlx::query_as(
        "SELECT * FROM study_content WHERE is_active = true ORDER BY view_count DESC, title LIMIT 10",
    )
    .fetch_all(&state.db)
    .await?;

    Ok(ok(json!({
        "overview": overview,
        "type_distribution": by_type,
        "difficulty_distribution": by_difficulty,
        "popular_content": popular,
    })))
}

async fn generate(
    State(state): State<AppState>,
    ValidJson(req): ValidJson<ContentGenerateReq>,
) -> AppResult<Json<Value>> {
    let context = load_context(&state.db, &req.subject, &req.chapter).await?;
    let plan = ContentPlan {
        subject: &req.subject,
        chapter: &req.chapter,
        topic: req.topic.as_deref(),
        content_type: req.content_type.as_str(),
        difficulty: &req.difficulty,
    };
    let level = DifficultyLevel::from_generation(&req.difficulty);
    let (content, source) = generate_content(&state.llm, &plan, &context).await;

    let id: Uuid = sqlx::query_scalar(
        "INSERT INTO study_content (id, title, subject, chapter, topic, content_type, difficulty_level, \
         duration_minutes, body) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(&content.title)
    .bind(&req.subject)
    .bind(&req.chapter)
    .bind(req.topic.as_deref().unwrap_or_default())
    .bind(req.content_type.as_str())
    .bind(level.as_str())
    .bind(content.duration_minutes)
    .bind(&content.content)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(content_id = %id, subject = %req.subject, chapter = %req.chapter, ?source, "study content generated");
    Ok(Json(json!({
        "success": true,
        "content": {
            "id": id,
            "title": content.title,
            "content": content.content,
            "duration_minutes": content.duration_minutes,
        },
        "source": source,
        "message": "Study content generated successfully",
    })))
}

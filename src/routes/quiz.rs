use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use sqlx::types::Json as Jsonb;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult},
    extract::{AppQuery, ValidJson},
    generate::{generate_quiz, QuizPlan},
    models::{QuizGenerateReq, QuizResult, QuizResultReq, UserIdQuery},
    state::AppState,
    syllabus::load_context,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(results))
        .route("/results", post(record_result))
        .route("/generate", post(generate))
}

async fn results(State(state): State<AppState>, AppQuery(q): AppQuery<UserIdQuery>) -> AppResult<Json<Value>> {
    let user_id = q.user_id.ok_or_else(|| AppError::bad_request("Missing user_id"))?;
    let quizzes: Vec<QuizResult> =
        sqlx::query_as("SELECT * FROM quiz_results WHERE user_id = $1 ORDER BY taken_at DESC")
            .bind(user_id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(json!({ "quizzes": quizzes })))
}

async fn record_result(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ValidJson(req): ValidJson<QuizResultReq>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if req.score > req.total_questions {
        return Err(AppError::bad_request("score cannot exceed total_questions"));
    }
    let result: QuizResult = sqlx::query_as(
        "INSERT INTO quiz_results (id, user_id, subject, chapter, score, total_questions) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(&req.subject)
    .bind(&req.chapter)
    .bind(req.score)
    .bind(req.total_questions)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(user_id = %user.id, subject = %req.subject, score = req.score, total = req.total_questions, "quiz result recorded");
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "result": result }))))
}

async fn generate(State(state): State<AppState>, ValidJson(req): ValidJson<QuizGenerateReq>) -> AppResult<Json<Value>> {
    let context = load_context(&state.db, &req.subject, &req.chapter).await?;
    let plan = QuizPlan {
        subject: &req.subject,
        chapter: &req.chapter,
        topic: req.topic.as_deref(),
        difficulty: &req.difficulty,
        count: req.count as usize,
    };
    let (questions, source) = generate_quiz(&state.llm, &plan, &context).await;

    let mut tx = state.db.begin().await?;
    for q in &questions {
        sqlx::query(
            "INSERT INTO quiz_questions (id, subject, chapter, topic, question, options, correct_answer, \
             explanation, difficulty) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(Uuid::new_v4())
        .bind(&req.subject)
        .bind(&req.chapter)
        .bind(req.topic.as_deref().unwrap_or_default())
        .bind(&q.question)
        .bind(Jsonb(&q.options))
        .bind(q.correct_answer)
        .bind(&q.explanation)
        .bind(&req.difficulty)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(subject = %req.subject, chapter = %req.chapter, count = questions.len(), ?source, "quiz generated");
    Ok(Json(json!({
        "success": true,
        "questions": questions,
        "source": source,
        "message": format!("Generated {} questions", questions.len()),
    })))
}

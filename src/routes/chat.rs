use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    extract::AppJson,
    llm::{LlmError, Message, Sampling},
    models::ChatReq,
    state::AppState,
};

const SYSTEM_PROMPT: &str = "You are an educational AI assistant for students. Always answer in a concise \
paragraph or, if appropriate, in clear bullet points. Focus on being clear, direct, and helpful. Your responses \
should be educational, informative, and focused on the NCERT curriculum. If you do not know the answer, say so \
honestly. Help students prepare for exams and understand concepts easily.";

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(status).post(chat))
}

async fn status() -> Json<Value> {
    Json(json!({ "status": "API is working" }))
}

async fn chat(State(state): State<AppState>, AppJson(req): AppJson<ChatReq>) -> AppResult<Json<Value>> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("Message is required"));
    }

    let system = format!("{SYSTEM_PROMPT} Answer in {}.", req.language);
    let messages = [Message::system(system), Message::user(message)];
    let sampling = Sampling { temperature: 0.7, max_tokens: 1000 };

    let reply = state
        .llm
        .complete(&state.llm.chat_model, &messages, sampling)
        .await
        .map_err(|e| match e {
            LlmError::NotConfigured => AppError::ServiceUnavailable("Chat is not configured".into()),
            LlmError::Api { message, .. } => AppError::Upstream(message),
            other => AppError::Upstream(other.to_string()),
        })?;

    tracing::debug!(language = %req.language, chars = reply.len(), "chat answered");
    Ok(Json(json!({ "response": reply })))
}

use axum::{extract::State, http::StatusCode, middleware, routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{db, error, ratelimit, state::AppState};

mod auth;
mod chat;
mod content;
mod progress;
mod quiz;
mod syllabus;
mod user;
mod video;

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth::router(&state))
        .nest("/user", user::router())
        .nest("/syllabus", syllabus::router())
        .nest("/content", content::router())
        .nest("/video", video::router())
        .nest("/quiz", quiz::router())
        .nest("/progress", progress::router())
        .nest("/chat", chat::router())
        .layer(middleware::from_fn_with_state(state.api_limiter.clone(), ratelimit::limit));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .fallback(error::not_found)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = db::ping(&state.db).await;
    let status = if database { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
        "status": if database { "OK" } else { "DEGRADED" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
        "environment": state.config.environment,
        "database": if database { "connected" } else { "disconnected" },
    });
    (status, Json(body))
}

// --- response helpers ---

pub(crate) fn ok<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub(crate) fn ok_msg<T: Serialize>(message: impl Into<String>, data: T) -> Json<Value> {
    Json(json!({ "success": true, "message": message.into(), "data": data }))
}

pub(crate) fn created<T: Serialize>(message: impl Into<String>, data: T) -> (StatusCode, Json<Value>) {
    (StatusCode::CREATED, ok_msg(message, data))
}

/// A caller-supplied sort column, if it is one of `allowed`.
pub(crate) fn sort_column(requested: Option<&str>, allowed: &[&'static str]) -> Option<&'static str> {
    let requested = requested?;
    allowed.iter().copied().find(|c| *c == requested)
}

pub(crate) fn direction(descending: bool) -> &'static str {
    if descending {
        "DESC"
    } else {
        "ASC"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::test_user,
        config::Config,
        models::Role,
    };
    use axum::{
        body::Body,
        http::{header, Request},
        response::Response,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        app_with(Config::for_tests())
    }

    fn app_with(config: Config) -> Router {
        let db = db::lazy(&config);
        router(AppState::new(db, config).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn sort_column_is_whitelisted() {
        let allowed = ["class", "subject", "chapter_number"];
        assert_eq!(sort_column(Some("subject"), &allowed), Some("subject"));
        assert_eq!(sort_column(Some("subject; DROP TABLE users"), &allowed), None);
        assert_eq!(sort_column(None, &allowed), None);
        assert_eq!(direction(true), "DESC");
    }

    #[tokio::test]
    async fn unknown_route_uses_error_envelope() {
        let res = app()
            .oneshot(Request::get("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let body = body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["message"], "Route not found");
        assert_eq!(body["error"]["statusCode"], 404);
    }

    #[tokio::test]
    async fn register_rejects_invalid_body() {
        let res = app()
            .oneshot(post_json(
                "/api/auth/register",
                json!({ "name": "A", "email": "nope", "password": "x", "class": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Validation error"), "{message}");
    }

    #[tokio::test]
    async fn register_rejects_weak_password_before_db() {
        let res = app()
            .oneshot(post_json(
                "/api/auth/register",
                json!({ "name": "Asha", "email": "asha@example.com", "password": "alllowercase", "class": "SSLC" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Password validation failed"));
        assert!(message.contains("uppercase"));
    }

    #[tokio::test]
    async fn sixth_auth_attempt_is_rate_limited() {
        let app = app();
        for _ in 0..5 {
            let res = app
                .clone()
                .oneshot(post_json("/api/auth/login", json!({ "email": "bad", "password": "" })))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            assert!(res.headers().contains_key("ratelimit-remaining"));
        }
        let res = app
            .oneshot(post_json("/api/auth/login", json!({ "email": "bad", "password": "" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn forwarded_for_rotation_does_not_reset_auth_limit() {
        let app = app();
        let mut statuses = Vec::new();
        for i in 0..7 {
            let mut req = post_json("/api/auth/login", json!({ "email": "bad", "password": "" }));
            req.headers_mut()
                .insert("x-forwarded-for", format!("10.0.0.{i}").parse().unwrap());
            statuses.push(app.clone().oneshot(req).await.unwrap().status());
        }
        assert_eq!(statuses[4], StatusCode::BAD_REQUEST);
        assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(statuses[6], StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn protected_routes_need_a_token() {
        let res = app()
            .oneshot(Request::get("/api/auth/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"]["message"], "Access token required");

        let res = app()
            .oneshot(
                Request::get("/api/auth/profile")
                    .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(res).await["error"]["message"], "Invalid token");
    }

    #[tokio::test]
    async fn refresh_token_is_rejected_as_bearer() {
        let config = Config::for_tests();
        let keys = crate::auth::TokenKeys::new(&config);
        let refresh = keys.issue_refresh(test_user(Role::Admin).id).unwrap();
        let res = app_with(config)
            .oneshot(
                Request::delete(format!("/api/syllabus/{}", uuid::Uuid::new_v4()))
                    .header(header::AUTHORIZATION, format!("Bearer {refresh}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn malformed_ids_are_bad_requests() {
        let res = app()
            .oneshot(Request::get("/api/syllabus/not-a-uuid").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"]["message"], "Invalid ID format");
    }

    #[tokio::test]
    async fn user_id_is_required() {
        for uri in ["/api/progress", "/api/quiz", "/api/progress?user_id="] {
            let res = app().oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body_json(res).await["error"]["message"], "Missing user_id");
        }
    }

    #[tokio::test]
    async fn profile_lookup_requires_email() {
        let res = app()
            .oneshot(Request::get("/api/user/profile").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["error"]["message"], "Missing email");
    }

    #[tokio::test]
    async fn chat_status_and_validation() {
        let res = app()
            .oneshot(Request::get("/api/chat").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "API is working");

        let res = app()
            .oneshot(post_json("/api/chat", json!({ "message": "   " })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn chat_without_api_key_is_unavailable() {
        let res = app()
            .oneshot(post_json("/api/chat", json!({ "message": "What is inertia?" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn chat_relays_llm_reply() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":" Inertia resists change in motion. "}}]}"#)
            .create_async()
            .await;
        let mut config = Config::for_tests();
        config.openrouter_base_url = server.url();
        config.openrouter_api_key = Some("k".into());

        let res = app_with(config)
            .oneshot(post_json("/api/chat", json!({ "message": "What is inertia?", "language": "kannada" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["response"], "Inertia resists change in motion.");
    }

    #[tokio::test]
    async fn chat_upstream_failure_is_bad_gateway() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body(r#"{"error":{"message":"Provider returned error"}}"#)
            .create_async()
            .await;
        let mut config = Config::for_tests();
        config.openrouter_base_url = server.url();
        config.openrouter_api_key = Some("k".into());

        let res = app_with(config)
            .oneshot(post_json("/api/chat", json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(body_json(res).await["error"]["message"], "Provider returned error");
    }

    #[tokio::test]
    async fn quiz_generation_validates_count() {
        let res = app()
            .oneshot(post_json(
                "/api/quiz/generate",
                json!({ "subject": "Physics", "chapter": "Motion", "count": 50 }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn content_generation_rejects_unknown_content_type() {
        let res = app()
            .oneshot(post_json(
                "/api/content/generate",
                json!({ "subject": "Physics", "chapter": "Motion", "content_type": "podcast" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn duplicate_email_and_wrong_password_against_database() {
        let Some(db) = db::test_pool().await else { return };
        let app = router(AppState::new(db.clone(), Config::for_tests()).unwrap());
        let email = format!("asha-{}@example.com", uuid::Uuid::new_v4().simple());
        let register = json!({ "name": "Asha", "email": email, "password": "Str0ng!pass", "class": "SSLC" });

        let res = app.clone().oneshot(post_json("/api/auth/register", register.clone())).await.unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = body_json(res).await;
        assert_eq!(body["data"]["user"]["email"], email.as_str());

        let res = app.clone().oneshot(post_json("/api/auth/register", register)).await.unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let body = body_json(res).await;
        assert_eq!(body["error"]["message"], "User with this email already exists");

        let res = app
            .clone()
            .oneshot(post_json("/api/auth/login", json!({ "email": email, "password": "Wr0ng!pass" })))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(res).await;
        assert_eq!(body["error"]["message"], "Invalid email or password");

        sqlx::query("DELETE FROM users WHERE email = $1").bind(&email).execute(&db).await.unwrap();
    }

    #[tokio::test]
    async fn syllabus_listing_exposes_grouped_map_without_paging() {
        let Some(db) = db::test_pool().await else { return };
        let class = format!("class-{}", uuid::Uuid::new_v4().simple());
        for (number, name) in [(1, "Real Numbers"), (2, "Polynomials")] {
            sqlx::query(
                "INSERT INTO syllabus (id, class, subject, chapter_name, chapter_number) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(uuid::Uuid::new_v4())
            .bind(&class)
            .bind("Mathematics")
            .bind(name)
            .bind(number)
            .execute(&db)
            .await
            .unwrap();
        }
        let app = router(AppState::new(db.clone(), Config::for_tests()).unwrap());

        let res = app
            .oneshot(Request::get(format!("/api/syllabus?class={class}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        let chapters = body["syllabus"][class.as_str()]["Mathematics"].as_array().unwrap();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0]["chapter_name"], "Real Numbers");
        assert_eq!(body["data"], body["syllabus"]);
        assert_eq!(body["pagination"]["pages"], 1);

        sqlx::query("DELETE FROM syllabus WHERE class = $1").bind(&class).execute(&db).await.unwrap();
    }

    #[tokio::test]
    async fn health_reports_degraded_without_database() {
        let res = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(res).await;
        assert_eq!(body["status"], "DEGRADED");
        assert_eq!(body["environment"], "test");
    }
}

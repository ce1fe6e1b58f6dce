use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Config;

const REFERER: &str = "https://kalika-edu.vercel.app";
const TITLE: &str = "Kalika Education Platform";

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API key not configured")]
    NotConfigured,
    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid response format from LLM API")]
    BadResponse,
}

#[derive(Serialize, Debug, Clone)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    pub chat_model: String,
    pub generation_model: String,
}

impl LlmClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self {
            http,
            base_url: config.openrouter_base_url.trim_end_matches('/').to_string(),
            api_key: config.openrouter_api_key.clone(),
            chat_model: config.chat_model.clone(),
            generation_model: config.generation_model.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// One chat-completions round trip; returns the first choice's text.
    pub async fn complete(&self, model: &str, messages: &[Message], sampling: Sampling) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": model,
            "messages": messages,
            "temperature": sampling.temperature,
            "max_tokens": sampling.max_tokens,
        });

        tracing::debug!(%model, %url, "calling LLM");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .filter(|m| !m.is_empty())
                .unwrap_or(if text.is_empty() { format!("status {status}") } else { text });
            tracing::warn!(status = status.as_u16(), %message, "LLM API returned an error");
            return Err(LlmError::Api { status: status.as_u16(), message });
        }

        let json: Value = resp.json().await?;
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(LlmError::BadResponse)
    }
}

#[cfg(test)]
pub(crate) fn test_client(base_url: &str, api_key: Option<&str>) -> LlmClient {
    let mut config = Config::for_tests();
    config.openrouter_base_url = base_url.to_string();
    config.openrouter_api_key = api_key.map(str::to_string);
    LlmClient::new(&config).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLING: Sampling = Sampling { temperature: 0.7, max_tokens: 100 };

    #[tokio::test]
    async fn returns_first_choice_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  Photosynthesis makes glucose.  "}}]}"#)
            .create_async()
            .await;

        let client = test_client(&server.url(), Some("test-key"));
        let reply = client
            .complete("m", &[Message::user("What is photosynthesis?")], SAMPLING)
            .await
            .unwrap();
        assert_eq!(reply, "Photosynthesis makes glucose.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn surfaces_upstream_error_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit exceeded"}}"#)
            .create_async()
            .await;

        let client = test_client(&server.url(), Some("k"));
        match client.complete("m", &[Message::user("hi")], SAMPLING).await {
            Err(LlmError::Api { status, message }) => {
                assert_eq!(status, 429);
                assert_eq!(message, "Rate limit exceeded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_content_is_bad_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = test_client(&server.url(), Some("k"));
        let err = client.complete("m", &[Message::user("hi")], SAMPLING).await.unwrap_err();
        assert!(matches!(err, LlmError::BadResponse));
    }

    #[tokio::test]
    async fn without_key_fails_fast() {
        let client = test_client("http://127.0.0.1:1", None);
        assert!(!client.is_configured());
        let err = client.complete("m", &[Message::user("hi")], SAMPLING).await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured));
    }
}

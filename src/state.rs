use std::{sync::Arc, time::Instant};

use crate::{auth::TokenKeys, config::Config, db::Db, llm::LlmClient, ratelimit::RateLimiter};

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenKeys>,
    pub llm: LlmClient,
    pub api_limiter: Arc<RateLimiter>,
    pub auth_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Db, config: Config) -> anyhow::Result<Self> {
        let tokens = TokenKeys::new(&config);
        let llm = LlmClient::new(&config)?;
        let api_limiter =
            RateLimiter::new(config.api_rate_limit, config.rate_limit_window).trust_proxy(config.trust_proxy);
        let auth_limiter =
            RateLimiter::new(config.auth_rate_limit, config.rate_limit_window).trust_proxy(config.trust_proxy);
        Ok(Self {
            db,
            config: Arc::new(config),
            tokens: Arc::new(tokens),
            llm,
            api_limiter: Arc::new(api_limiter),
            auth_limiter: Arc::new(auth_limiter),
            started_at: Instant::now(),
        })
    }
}

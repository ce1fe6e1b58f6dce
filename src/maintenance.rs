use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::{db::Db, state::AppState};

pub const INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    pub refresh_tokens: u64,
    pub reset_tokens: u64,
    pub rate_windows: usize,
}

impl Sweep {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

async fn purge_expired(db: &Db, table: &str) -> Result<u64, sqlx::Error> {
    let done = sqlx::query(&format!("DELETE FROM {table} WHERE expires_at < now()"))
        .execute(db)
        .await?;
    Ok(done.rows_affected())
}

/// Deletes expired refresh/reset tokens and stale rate-limit windows.
pub async fn sweep(state: &AppState) -> Result<Sweep, sqlx::Error> {
    let refresh_tokens = purge_expired(&state.db, "refresh_tokens").await?;
    let reset_tokens = purge_expired(&state.db, "password_reset_tokens").await?;
    let rate_windows = state.api_limiter.prune() + state.auth_limiter.prune();
    Ok(Sweep { refresh_tokens, reset_tokens, rate_windows })
}

pub fn spawn(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match sweep(&state).await {
                Ok(s) if s.is_empty() => tracing::debug!("maintenance sweep: nothing to clean"),
                Ok(s) => tracing::info!(
                    refresh_tokens = s.refresh_tokens,
                    reset_tokens = s.reset_tokens,
                    rate_windows = s.rate_windows,
                    "maintenance sweep finished"
                ),
                Err(e) => tracing::error!(error = %e, "maintenance sweep failed"),
            }
        }
    })
}

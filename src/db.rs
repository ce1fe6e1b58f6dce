use anyhow::Result;
use sqlx::{postgres::PgPoolOptions, Pool, Postgres};

use crate::config::Config;

pub type Db = Pool<Postgres>;

pub async fn connect(config: &Config) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect(&config.database_url)
        .await?;
    tracing::info!(max_connections = config.db_max_connections, "database pool ready");
    Ok(pool)
}

pub async fn ping(db: &Db) -> bool {
    match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(db).await {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(error = %e, "database health check failed");
            false
        }
    }
}

/// Pool that never connects until a query runs. Router tests use it to
/// exercise everything that happens before the first query.
#[cfg(test)]
pub fn lazy(config: &Config) -> Db {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.db_acquire_timeout)
        .connect_lazy(&config.database_url)
        .expect("valid test database url")
}

/// Migrated pool on `DATABASE_URL`, or `None` when it is unset so the
/// database-backed tests skip.
#[cfg(test)]
pub async fn test_pool() -> Option<Db> {
    let url = std::env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty())?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    sqlx::migrate!("./migrations").run(&pool).await.expect("run migrations");
    Some(pool)
}

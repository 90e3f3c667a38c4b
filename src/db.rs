use std::str::FromStr;

use anyhow::Context;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};

use crate::config::AppConfig;

/// Connection options from `DATABASE_URL`, with `DB_NAME` taking precedence
/// over the database named in the URL.
pub fn connect_options(config: &AppConfig) -> anyhow::Result<PgConnectOptions> {
    let options =
        PgConnectOptions::from_str(&config.database_url).context("parse DATABASE_URL")?;
    Ok(match &config.database_name {
        Some(name) => options.database(name),
        None => options,
    })
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options(config)?)
        .await
        .context("connect to database")
}

/// Applies `migrations/`; a failure is logged and startup continues.
pub async fn migrate(db: &PgPool) {
    match sqlx::migrate!("./migrations").run(db).await {
        Ok(()) => tracing::debug!("migrations applied"),
        Err(e) => tracing::warn!(error = %e, "migration failed; continuing"),
    }
}

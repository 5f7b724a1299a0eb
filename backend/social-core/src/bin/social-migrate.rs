//! Applies the embedded migrations to `DATABASE_URL`

use anyhow::{Context, Result};
use social_core::config::Config;
use social_core::{db, logging};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    logging::init_tracing(config.app.log_format);

    info!(env = %config.app.env, "Starting social-core migrations");

    let pool = db::init_pool(config.database)
        .await
        .context("Failed to connect to database")?;

    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    info!("Migrations applied");
    pool.close().await;
    Ok(())
}

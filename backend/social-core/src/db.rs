use db_pool::{create_pool, DbConfig};
use sqlx::migrate::Migrator;
use sqlx::PgPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Shared pool, verified and with metrics running
pub async fn init_pool(config: DbConfig) -> Result<PgPool, sqlx::Error> {
    config.log_config();
    create_pool(config).await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

pub mod backup;
pub mod invitations;
pub mod records;
pub mod users;

pub use backup::*;
pub use invitations::*;
pub use records::*;
pub use users::*;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use tokio::time::timeout;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{info, instrument};

use crate::env::AppConfig;
use crate::error::AppError;

#[instrument(skip_all, fields(max_connections = config.max_connections))]
pub async fn connect(config: &AppConfig) -> Result<SqlitePool, AppError> {
    info!("Connecting to database");
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.db_timeout())
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[instrument(skip_all)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), AppError> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Bounds a store operation by `limit`. When the deadline passes the
/// operation is dropped, which rolls back any transaction it had open.
pub async fn with_deadline<T, F>(limit: Duration, operation: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!(
            "Database operation exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod db;
mod env;
mod error;
mod models;
mod telemetry;
#[cfg(test)]
mod test;
mod validation;

use api::{
    api_check_auth, api_create_goal, api_create_invite, api_create_log, api_create_student,
    api_dashboard_stats, api_delete_goal, api_delete_log, api_delete_student, api_delete_user,
    api_export_backup, api_export_goal, api_get_goal, api_get_profile, api_list_goals,
    api_list_logs, api_list_students, api_list_users, api_login, api_logout, api_pin_status,
    api_redeem_invite, api_remove_pin, api_reset_database, api_restore_backup, api_set_pin,
    api_setup, api_status, api_update_goal, api_update_log, api_update_profile,
    api_update_student, api_update_user_role, api_verify_invite, api_verify_pin, health,
};
use auth::{Credentials, default_api, unauthorized_api};
use env::{AppConfig, EnvFile, load_environment};
use error::AppError;
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use telemetry::{TelemetryFairing, init_tracing};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Anyhow(anyhow::Error),
    #[error("{0}")]
    Figment(rocket::figment::Error),
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("{0}")]
    Rocket(Box<rocket::Error>),
}

impl From<anyhow::Error> for Error {
    fn from(value: anyhow::Error) -> Self {
        Error::Anyhow(value)
    }
}

impl From<rocket::figment::Error> for Error {
    fn from(value: rocket::figment::Error) -> Self {
        Error::Figment(value)
    }
}

impl From<rocket::Error> for Error {
    fn from(value: rocket::Error) -> Self {
        Error::Rocket(Box::new(value))
    }
}

#[rocket::main]
async fn main() -> Result<(), Error> {
    let env_files = load_environment()
        .map_err(|err| anyhow::anyhow!("Failed to load environment: {}", err))?;
    let _otel_guard = init_tracing();
    env_files.iter().for_each(EnvFile::log);

    let config = AppConfig::from_figment(&rocket::Config::figment())?;

    let pool = db::connect(&config).await?;
    db::run_migrations(&pool).await?;
    info!("Migrations completed successfully");

    let _rocket = init_rocket(pool, config).launch().await?;
    Ok(())
}

pub fn init_rocket(pool: SqlitePool, config: AppConfig) -> Rocket<Build> {
    info!("Starting goal tracker");

    rocket::build()
        .manage(pool)
        .manage(Credentials::new(config.bcrypt_cost))
        .manage(config)
        .mount(
            "/api",
            routes![
                health,
                api_status,
                api_setup,
                api_login,
                api_logout,
                api_check_auth,
                api_get_profile,
                api_update_profile,
                api_pin_status,
                api_set_pin,
                api_remove_pin,
                api_verify_pin,
                api_create_invite,
                api_verify_invite,
                api_redeem_invite,
                api_list_users,
                api_update_user_role,
                api_delete_user,
                api_export_backup,
                api_restore_backup,
                api_reset_database,
                api_create_student,
                api_list_students,
                api_update_student,
                api_delete_student,
                api_create_goal,
                api_list_goals,
                api_get_goal,
                api_update_goal,
                api_delete_goal,
                api_export_goal,
                api_create_log,
                api_list_logs,
                api_update_log,
                api_delete_log,
                api_dashboard_stats,
            ],
        )
        .register("/api", catchers![unauthorized_api, default_api])
        .attach(TelemetryFairing)
}

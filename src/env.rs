use std::path::Path;
use std::time::Duration;

use rocket::figment::{
    Figment,
    providers::{Env, Serialized},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Outcome of reading one env file, logged after the subscriber is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvFile {
    Loaded(&'static str),
    Missing(&'static str),
}

impl EnvFile {
    pub fn log(&self) {
        match self {
            EnvFile::Loaded(path) => info!("Loaded environment from: {}", path),
            EnvFile::Missing(path) => warn!("Environment file {} not found, skipping", path),
        }
    }
}

pub fn load_environment() -> Result<Vec<EnvFile>, Box<dyn std::error::Error>> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    env_files.into_iter().map(load_env_file).collect()
}

fn load_env_file(path: &'static str) -> Result<EnvFile, Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        return Ok(EnvFile::Missing(path));
    }

    dotenvy::from_filename_override(path)?;
    Ok(EnvFile::Loaded(path))
}

/// Application settings layered on top of Rocket's own configuration.
///
/// Values come from defaults, then Rocket's figment (`Rocket.toml`,
/// `ROCKET_*`), then a bare `DATABASE_URL`, then `GOALS_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: String,
    pub bcrypt_cost: u32,
    pub session_hours: i64,
    pub db_timeout_secs: u64,
    pub max_connections: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://goals.db?mode=rwc".to_string(),
            bcrypt_cost: 14,
            session_hours: 24,
            db_timeout_secs: 10,
            max_connections: 5,
        }
    }
}

impl AppConfig {
    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(figment.clone())
            .merge(Env::raw().only(&["database_url"]))
            .merge(Env::prefixed("GOALS_"))
            .extract()
    }

    pub fn db_timeout(&self) -> Duration {
        Duration::from_secs(self.db_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_hours)
    }
}

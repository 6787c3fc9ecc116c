use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub app_base_url: String,
    pub weights_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set to a production Postgres instance")?,
            port: try_load("PORT", "8000")?,
            max_connections: try_load("DB_MAX_CONNECTIONS", "5")?,
            app_base_url: try_load("APP_BASE_URL", "http://127.0.0.1:8000")?,
            weights_path: env::var("RISK_WEIGHTS").ok().map(PathBuf::from),
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow!("Invalid {key} value '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let port: u16 = try_load("COURSE_TRACKER_TEST_UNSET_PORT", "8000").unwrap();
        assert_eq!(port, 8000);
    }

    #[test]
    fn unparsable_values_are_errors() {
        let result: anyhow::Result<u16> = try_load("COURSE_TRACKER_TEST_UNSET_BAD", "not-a-port");
        let message = result.unwrap_err().to_string();
        assert!(message.contains("COURSE_TRACKER_TEST_UNSET_BAD"));
    }
}

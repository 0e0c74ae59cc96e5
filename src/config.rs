use std::{env, fmt::Display, str::FromStr};

use anyhow::{anyhow, Context};
use sqlx::postgres::PgConnectOptions;
use tracing::{info, warn};

pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok();
        if database_url.is_none() {
            warn!("DATABASE_URL not set, connecting with the PG* environment variables");
        }

        Ok(Self {
            host: try_load("HTTP_HOST", "127.0.0.1")?,
            port: try_load("HTTP_PORT", "8080")?,
            database_url,
            max_connections: try_load("DB_MAX_CONNECTIONS", "10")?,
        })
    }

    /// Falls back to the libpq `PG*` variables when `DATABASE_URL` is unset.
    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        match &self.database_url {
            Some(url) => url.parse().context("DATABASE_URL is not a valid postgres url"),
            None => Ok(PgConnectOptions::new()),
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow!("invalid {key} value: {e}"))
}

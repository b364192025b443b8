//! Server configuration
//!
//! All settings are read from environment variables (a `.env` file is loaded first, if present). Values that are
//! missing fall back to their defaults. Values that are present but cannot be parsed log a warning and also fall back
//! to their defaults, so a typo never stops the server from starting.
//!
//! | Variable                  | Default                          |
//! |---------------------------|----------------------------------|
//! | `MKP_HOST`                | `127.0.0.1`                      |
//! | `MKP_PORT`                | `8360`                           |
//! | `MKP_DATABASE_URL`        | `sqlite://data/marketplace.db`   |
//! | `MKP_DB_MAX_CONNECTIONS`  | `25`                             |
//! | `MKP_HOLD_WINDOW_MINUTES` | `30`                             |
//! | `MKP_SWEEP_INTERVAL_SECS` | `60`                             |
//! | `MKP_RUN_MIGRATIONS`      | `true`                           |
//! | `MKP_EVENT_BUFFER_SIZE`   | `25`                             |
use std::{env, fmt::Display, str::FromStr};

use chrono::Duration;
use log::*;
use marketplace_engine::ledger::DEFAULT_HOLD_WINDOW_MINUTES;
use mkp_common::helpers::parse_boolean_flag;

const DEFAULT_MKP_HOST: &str = "127.0.0.1";
const DEFAULT_MKP_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/marketplace.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_EVENT_BUFFER_SIZE: usize = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    /// How long an unpaid order keeps its stock reserved before the expiry worker cancels it.
    pub hold_window: Duration,
    /// How often the expiry worker looks for stale reservations.
    pub sweep_interval: std::time::Duration,
    /// If true, embedded migrations are applied to the database on startup.
    pub run_migrations: bool,
    /// The queue size for each event hook. Publishers wait when a queue is full.
    pub event_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_MKP_HOST.to_string(),
            port: DEFAULT_MKP_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            hold_window: Duration::minutes(DEFAULT_HOLD_WINDOW_MINUTES),
            sweep_interval: std::time::Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            run_migrations: true,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("MKP_HOST").ok().unwrap_or_else(|| DEFAULT_MKP_HOST.into());
        let port = parse_or_default("MKP_PORT", env::var("MKP_PORT").ok(), DEFAULT_MKP_PORT);
        let database_url = env::var("MKP_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ MKP_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}");
            DEFAULT_DATABASE_URL.into()
        });
        let db_max_connections = parse_or_default(
            "MKP_DB_MAX_CONNECTIONS",
            env::var("MKP_DB_MAX_CONNECTIONS").ok(),
            DEFAULT_DB_MAX_CONNECTIONS,
        );
        let hold_window_minutes = parse_positive(
            "MKP_HOLD_WINDOW_MINUTES",
            env::var("MKP_HOLD_WINDOW_MINUTES").ok(),
            DEFAULT_HOLD_WINDOW_MINUTES,
        );
        let sweep_interval_secs = parse_positive(
            "MKP_SWEEP_INTERVAL_SECS",
            env::var("MKP_SWEEP_INTERVAL_SECS").ok(),
            DEFAULT_SWEEP_INTERVAL_SECS,
        );
        let run_migrations = parse_boolean_flag(env::var("MKP_RUN_MIGRATIONS").ok(), true);
        let event_buffer_size = parse_positive(
            "MKP_EVENT_BUFFER_SIZE",
            env::var("MKP_EVENT_BUFFER_SIZE").ok(),
            DEFAULT_EVENT_BUFFER_SIZE,
        );
        let config = Self {
            host,
            port,
            database_url,
            db_max_connections,
            hold_window: Duration::minutes(hold_window_minutes),
            sweep_interval: std::time::Duration::from_secs(sweep_interval_secs),
            run_migrations,
            event_buffer_size,
        };
        debug!("🪛️ Server configuration: {config:?}");
        config
    }
}

/// Parses `value`, logging a warning and returning `default` if it is present but invalid.
fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(s) = value else {
        return default;
    };
    s.trim().parse::<T>().unwrap_or_else(|e| {
        warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
        default
    })
}

fn parse_positive<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display + PartialOrd + Default + Copy,
    T::Err: Display,
{
    let parsed = parse_or_default(name, value, default);
    if parsed <= T::default() {
        warn!("🪛️ {name} must be greater than zero. Using the default, {default}, instead.");
        return default;
    }
    parsed
}

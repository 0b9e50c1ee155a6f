//! Configuration loading and representation.
//!
//! Everything comes from environment variables with development defaults, so a
//! bare `cargo run` starts an in-memory server.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_PROFILE_CACHE_TTL: Duration = Duration::from_secs(300);
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid value for {var} ({value:?}): {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres connection string; `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// TTL of the cached profile resolver.
    pub profile_cache_ttl: Duration,
    /// Install the permission catalog and system profiles at startup.
    pub seed_defaults: bool,
    /// When set, a user with this email is created (if missing) and given
    /// the `admin` profile at startup.
    pub bootstrap_admin_email: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or("BIND_ADDR", get("BIND_ADDR"), || {
            DEFAULT_BIND_ADDR.parse().map_err(|e| format!("{e}"))
        })?;

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", get("DATABASE_MAX_CONNECTIONS"), || Ok(5))?;

        let profile_cache_ttl = parse_or("PROFILE_CACHE_TTL_SECS", get("PROFILE_CACHE_TTL_SECS"), || {
            Ok(DEFAULT_PROFILE_CACHE_TTL.as_secs())
        })
        .map(Duration::from_secs)?;

        let seed_defaults = match get("SEED_DEFAULTS") {
            Some(raw) => parse_bool("SEED_DEFAULTS", &raw)?,
            None => true,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url: get("DATABASE_URL"),
            database_max_connections,
            profile_cache_ttl,
            seed_defaults,
            bootstrap_admin_email: get("BOOTSTRAP_ADMIN_EMAIL"),
        })
    }

    /// In-memory configuration for tests: ephemeral port, seeded defaults.
    pub fn for_tests(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            jwt_secret: jwt_secret.into(),
            database_url: None,
            database_max_connections: 1,
            profile_cache_ttl: DEFAULT_PROFILE_CACHE_TTL,
            seed_defaults: true,
            bootstrap_admin_email: None,
        }
    }
}

fn parse_or<T, D>(var: &'static str, raw: Option<String>, default: D) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
    D: FnOnce() -> Result<T, String>,
{
    match raw {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            var,
            reason: e.to_string(),
            value,
        }),
        None => default().map_err(|reason| ConfigError {
            var,
            value: String::new(),
            reason,
        }),
    }
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError {
            var,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

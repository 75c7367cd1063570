//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All optional:
//! - `PORT` - Listen port (default: 8083)
//! - `DATABASE_URL` - `PostgreSQL` connection string; selects the Postgres record store
//! - `DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `NATS_URL` - NATS server for domain event publishing
//! - `CART_BACKEND` - `local` or `remote` (default: local)
//! - `CART_STORAGE_DIR` - Directory for local cart blobs (default: .cart)
//! - `CATALOG_SEED` - JSON seed for the in-memory record store (default: data/catalog.json)
//! - `PAGE_SIZE` - Catalog page size (default: 12)
//! - `CHECKOUT_DELAY_MS` - Simulated order processing time (default: 2000)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::query::DEFAULT_PAGE_SIZE;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CHECKOUT_DELAY_MS: u64 = 2000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Where cart lines are persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CartBackendKind {
    /// One JSON blob per session on local disk.
    #[default]
    Local,
    /// Rows in the record store's `cart_items` table.
    Remote,
}

impl FromStr for CartBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("expected `local` or `remote`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
    pub cart_backend: CartBackendKind,
    pub cart_storage_dir: PathBuf,
    pub catalog_seed: PathBuf,
    pub page_size: usize,
    pub checkout_delay: Duration,
}

impl Config {
    /// Load configuration from the process environment, after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let page_size: usize = parse_or(&lookup, "PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        if page_size == 0 {
            return Err(ConfigError::InvalidEnvVar("PAGE_SIZE".into(), "must be at least 1".into()));
        }

        Ok(Self {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            database_url: optional("DATABASE_URL"),
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            nats_url: optional("NATS_URL"),
            cart_backend: parse_or(&lookup, "CART_BACKEND", CartBackendKind::default())?,
            cart_storage_dir: optional("CART_STORAGE_DIR").map_or_else(|| PathBuf::from(".cart"), PathBuf::from),
            catalog_seed: optional("CATALOG_SEED").map_or_else(|| PathBuf::from("data/catalog.json"), PathBuf::from),
            page_size,
            checkout_delay: Duration::from_millis(parse_or(&lookup, "CHECKOUT_DELAY_MS", DEFAULT_CHECKOUT_DELAY_MS)?),
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.database_url, None);
        assert_eq!(config.cart_backend, CartBackendKind::Local);
        assert_eq!(config.cart_storage_dir, PathBuf::from(".cart"));
        assert_eq!(config.page_size, 12);
        assert_eq!(config.checkout_delay, Duration::from_millis(2000));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/luxe"),
            ("CART_BACKEND", "Remote"),
            ("PAGE_SIZE", "24"),
            ("CHECKOUT_DELAY_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/luxe"));
        assert_eq!(config.cart_backend, CartBackendKind::Remote);
        assert_eq!(config.page_size, 24);
        assert_eq!(config.checkout_delay, Duration::ZERO);
    }

    #[test]
    fn test_blank_values_fall_back() {
        let config = load(&[("PORT", " "), ("NATS_URL", "")]).unwrap();
        assert_eq!(config.port, 8083);
        assert!(config.nats_url.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(load(&[("PORT", "eighty")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PORT"));
        assert!(matches!(load(&[("CART_BACKEND", "cloud")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "CART_BACKEND"));
        assert!(matches!(load(&[("PAGE_SIZE", "0")]), Err(ConfigError::InvalidEnvVar(k, _)) if k == "PAGE_SIZE"));
    }
}

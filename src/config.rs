//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - PostgreSQL connection string. When unset the service runs
//!   on the in-memory store (nothing survives a restart).
//! - `DB_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `HOST` - Bind address (default: 0.0.0.0)
//! - `PORT` - Listen port (default: 8083)
//! - `NATS_URL` - Event bus for domain events (optional)
//! - `ORDER_STRICT_TRANSITIONS` - Enforce the linear status path (default: false)
//! - `ORDER_RESTOCK_ON_CANCEL` - Return stock when an order is cancelled (default: true)
//! - `ORDER_HIDE_FOREIGN` - Answer 404 instead of 403 when a customer fetches
//!   someone else's order (default: false)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

use crate::domain::aggregates::TransitionPolicy;
use crate::service::OrderPolicy;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    Invalid(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub nats_url: Option<String>,
    pub policy: OrderPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> { Self::from_lookup(|k| std::env::var(k).ok()) }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = TransitionPolicy::default();
        Ok(Self {
            host: parse(&get, "HOST")?.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: parse(&get, "PORT")?.unwrap_or(8083),
            database_url: get("DATABASE_URL"),
            db_max_connections: parse(&get, "DB_MAX_CONNECTIONS")?.unwrap_or(10),
            nats_url: get("NATS_URL"),
            policy: OrderPolicy {
                transitions: TransitionPolicy {
                    strict: flag(&get, "ORDER_STRICT_TRANSITIONS")?.unwrap_or(defaults.strict),
                    restock_on_cancel: flag(&get, "ORDER_RESTOCK_ON_CANCEL")?.unwrap_or(defaults.restock_on_cancel),
                },
                hide_foreign_orders: flag(&get, "ORDER_HIDE_FOREIGN")?.unwrap_or(false),
            },
        })
    }

    pub fn addr(&self) -> SocketAddr { SocketAddr::new(self.host, self.port) }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|v| v.parse::<T>().map_err(|e| ConfigError::Invalid(key.to_string(), e.to_string())))
        .transpose()
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>, ConfigError> {
    get(key)
        .map(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid(key.to_string(), format!("expected a boolean, got `{v}`"))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.addr().to_string(), "0.0.0.0:8083");
        assert!(c.database_url.is_none());
        assert_eq!(c.db_max_connections, 10);
        assert!(!c.policy.transitions.strict);
        assert!(c.policy.transitions.restock_on_cancel);
        assert!(!c.policy.hide_foreign_orders);
    }

    #[test]
    fn test_overrides() {
        let c = config(&[
            ("PORT", "9000"),
            ("HOST", "127.0.0.1"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("ORDER_STRICT_TRANSITIONS", "true"),
            ("ORDER_RESTOCK_ON_CANCEL", "0"),
            ("ORDER_HIDE_FOREIGN", "yes"),
            ("NATS_URL", "  "),
        ])
        .unwrap();
        assert_eq!(c.addr().to_string(), "127.0.0.1:9000");
        assert_eq!(c.database_url.as_deref(), Some("postgres://localhost/shop"));
        assert!(c.policy.transitions.strict);
        assert!(!c.policy.transitions.restock_on_cancel);
        assert!(c.policy.hide_foreign_orders);
        assert!(c.nats_url.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(config(&[("PORT", "eighty")]), Err(ConfigError::Invalid(k, _)) if k == "PORT"));
        assert!(matches!(config(&[("ORDER_HIDE_FOREIGN", "maybe")]), Err(ConfigError::Invalid(k, _)) if k == "ORDER_HIDE_FOREIGN"));
    }
}

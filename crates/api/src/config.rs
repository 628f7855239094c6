//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use domain::{DeletePolicy, OrderPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `AUTH_KEYS_DIR`: directory of `<kid>.pub.pem` / `<kid>.pem` files
///   (default: `"configs/keys"`)
/// - `AUTH_ISSUER`: issuer tokens must carry (default: `"ecommerce"`)
/// - `REQUEST_DEADLINE_MS`: transaction deadline (default: `5000`)
/// - `ORDER_RESTOCK_ON_CANCEL`: put stock back on cancel (default: `false`)
/// - `ORDER_DELETE_POLICY`: `unless_finished` or `unless_finished_or_paid`
///
/// Unparsable values fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub keys_dir: PathBuf,
    pub issuer: String,
    pub request_deadline: Duration,
    pub order_policy: OrderPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let order_policy = OrderPolicy::default()
            .with_restock_on_cancel(
                parse_var(&lookup, "ORDER_RESTOCK_ON_CANCEL")
                    .unwrap_or(defaults.order_policy.restock_on_cancel),
            )
            .with_delete(
                parse_var::<DeletePolicy>(&lookup, "ORDER_DELETE_POLICY")
                    .unwrap_or(defaults.order_policy.delete),
            );

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            keys_dir: lookup("AUTH_KEYS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.keys_dir),
            issuer: lookup("AUTH_ISSUER").unwrap_or(defaults.issuer),
            request_deadline: parse_var(&lookup, "REQUEST_DEADLINE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_deadline),
            order_policy,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            keys_dir: PathBuf::from("configs/keys"),
            issuer: "ecommerce".to_string(),
            request_deadline: Duration::from_millis(5000),
            order_policy: OrderPolicy::default(),
        }
    }
}

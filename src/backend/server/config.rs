/**
 * Server Configuration
 *
 * Configuration is read from environment variables (after `.env` has been
 * loaded by `main`), with defaults suitable for local development. Tests
 * build configurations with `ServerConfig::builder()`.
 *
 * # Variables
 *
 * | Variable                 | Default                 |
 * |--------------------------|-------------------------|
 * | SERVER_PORT              | 3000                    |
 * | DATABASE_URL             | unset: in-memory store  |
 * | JWT_SECRET               | development secret      |
 * | DELIVERY_WORKERS         | 10                      |
 * | DELIVERY_QUEUE_CAPACITY  | 100                     |
 * | DELIVERY_MODE            | immediate               |
 * | BATCH_SIZE               | 10                      |
 * | BATCH_FLUSH_INTERVAL_MS  | 50                      |
 * | IDLE_TIMEOUT_SECS        | 30                      |
 * | KEEPALIVE_TIMEOUT_SECS   | 60                      |
 * | PING_INTERVAL_SECS       | 25                      |
 * | OUTBOUND_BUFFER          | 64                      |
 *
 * # Database
 *
 * A missing `DATABASE_URL` is not an error: the server falls back to the
 * in-memory store and logs a warning. A configured database that cannot be
 * reached is an error.
 */

use std::str::FromStr;
use std::time::Duration;

use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::realtime::{DeliveryConfig, DeliveryMode, SessionSettings};

const DEV_JWT_SECRET: &str = "pigeon-development-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl ConfigError {
    fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub delivery: DeliveryConfig,
    pub session: SessionSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            delivery: DeliveryConfig::default(),
            session: SessionSettings::default(),
        }
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::invalid(key, format!("'{}': {}", raw, e)))
        })
        .transpose()
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Load from the process environment and validate
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(port) = parse_env("SERVER_PORT")? {
            config.port = port;
        }
        config.database_url = env_var("DATABASE_URL");
        match env_var("JWT_SECRET") {
            Some(secret) => config.jwt_secret = secret,
            None => warn!("JWT_SECRET not set, using the development secret"),
        }

        let delivery = &mut config.delivery;
        if let Some(workers) = parse_env("DELIVERY_WORKERS")? {
            delivery.workers = workers;
        }
        if let Some(capacity) = parse_env("DELIVERY_QUEUE_CAPACITY")? {
            delivery.queue_capacity = capacity;
        }
        if let Some(mode) = parse_env::<DeliveryMode>("DELIVERY_MODE")? {
            delivery.mode = mode;
        }
        if let Some(size) = parse_env("BATCH_SIZE")? {
            delivery.batch_size = size;
        }
        if let Some(ms) = parse_env("BATCH_FLUSH_INTERVAL_MS")? {
            delivery.flush_interval = Duration::from_millis(ms);
        }

        let session = &mut config.session;
        if let Some(secs) = parse_env("IDLE_TIMEOUT_SECS")? {
            session.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env("KEEPALIVE_TIMEOUT_SECS")? {
            session.keepalive_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env("PING_INTERVAL_SECS")? {
            session.ping_interval = Duration::from_secs(secs);
        }
        if let Some(frames) = parse_env("OUTBOUND_BUFFER")? {
            session.outbound_buffer = frames;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let delivery = &self.delivery;
        let session = &self.session;

        if delivery.workers == 0 {
            return Err(ConfigError::invalid("DELIVERY_WORKERS", "must be greater than 0"));
        }
        if delivery.queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "DELIVERY_QUEUE_CAPACITY",
                "must be greater than 0",
            ));
        }
        if delivery.batch_size == 0 {
            return Err(ConfigError::invalid("BATCH_SIZE", "must be greater than 0"));
        }
        if delivery.flush_interval.is_zero() {
            return Err(ConfigError::invalid(
                "BATCH_FLUSH_INTERVAL_MS",
                "must be greater than 0",
            ));
        }
        if session.outbound_buffer == 0 {
            return Err(ConfigError::invalid("OUTBOUND_BUFFER", "must be greater than 0"));
        }
        if session.idle_timeout.is_zero() {
            return Err(ConfigError::invalid("IDLE_TIMEOUT_SECS", "must be greater than 0"));
        }
        if session.keepalive_timeout <= session.idle_timeout {
            return Err(ConfigError::invalid(
                "KEEPALIVE_TIMEOUT_SECS",
                "must be longer than the idle timeout",
            ));
        }
        if session.ping_interval.is_zero() || session.ping_interval >= session.keepalive_timeout {
            return Err(ConfigError::invalid(
                "PING_INTERVAL_SECS",
                "must be non-zero and shorter than the keep-alive timeout",
            ));
        }
        Ok(())
    }
}

/// Builder for `ServerConfig`, starting from the defaults
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database_url = Some(url.into());
        self
    }

    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = secret.into();
        self
    }

    pub fn delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.config.delivery = delivery;
        self
    }

    pub fn session(mut self, session: SessionSettings) -> Self {
        self.config.session = session;
        self
    }

    pub fn build(self) -> Result<ServerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Connect to the configured database and run migrations
///
/// Returns `Ok(None)` when no `DATABASE_URL` is configured.
pub async fn load_database(config: &ServerConfig) -> Result<Option<PgPool>, ConfigError> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set, messages are kept in memory only");
        return Ok(None);
    };

    info!("connecting to database");
    let pool = PgPool::connect(url).await?;
    info!("running database migrations");
    sqlx::migrate!().run(&pool).await?;
    info!("database ready");
    Ok(Some(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serial_test::serial;

    const KEYS: &[&str] = &[
        "SERVER_PORT",
        "DATABASE_URL",
        "JWT_SECRET",
        "DELIVERY_WORKERS",
        "DELIVERY_QUEUE_CAPACITY",
        "DELIVERY_MODE",
        "BATCH_SIZE",
        "BATCH_FLUSH_INTERVAL_MS",
        "IDLE_TIMEOUT_SECS",
        "KEEPALIVE_TIMEOUT_SECS",
        "PING_INTERVAL_SECS",
        "OUTBOUND_BUFFER",
    ];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    fn set_env(key: &str, value: &str) {
        std::env::set_var(key, value);
    }

    #[test]
    #[serial]
    fn test_defaults_from_empty_env() {
        clear_env();
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 3000);
        assert!(config.database_url.is_none());
        assert_eq!(config.delivery, DeliveryConfig::default());
        assert_eq!(config.session, SessionSettings::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        set_env("SERVER_PORT", "8081");
        set_env("DELIVERY_MODE", "batched");
        set_env("BATCH_FLUSH_INTERVAL_MS", "20");
        set_env("IDLE_TIMEOUT_SECS", "5");
        set_env("KEEPALIVE_TIMEOUT_SECS", "10");
        set_env("PING_INTERVAL_SECS", "3");

        let config = ServerConfig::from_env().unwrap();
        clear_env();

        assert_eq!(config.port, 8081);
        assert_eq!(config.delivery.mode, DeliveryMode::Batched);
        assert_eq!(config.delivery.flush_interval, Duration::from_millis(20));
        assert_eq!(config.session.idle_timeout, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_unparseable_value_is_invalid() {
        clear_env();
        set_env("DELIVERY_WORKERS", "many");
        let result = ServerConfig::from_env();
        clear_env();
        assert_matches!(result, Err(ConfigError::Invalid { key: "DELIVERY_WORKERS", .. }));
    }

    #[test]
    fn test_keepalive_must_exceed_idle_timeout() {
        let session = SessionSettings {
            idle_timeout: Duration::from_secs(60),
            keepalive_timeout: Duration::from_secs(30),
            ..SessionSettings::default()
        };
        assert_matches!(
            ServerConfig::builder().session(session).build(),
            Err(ConfigError::Invalid { key: "KEEPALIVE_TIMEOUT_SECS", .. })
        );
    }

    #[test]
    fn test_zero_workers_rejected() {
        let delivery = DeliveryConfig {
            workers: 0,
            ..DeliveryConfig::default()
        };
        assert!(ServerConfig::builder().delivery(delivery).build().is_err());
    }
}

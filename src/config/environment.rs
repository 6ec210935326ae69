// ABOUTME: Environment-only configuration loading for the Tessera server
// ABOUTME: Parses ports, database URL, pool limits, JWT settings, tenant header, and logging
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Environment Configuration
//!
//! All settings come from environment variables. There is no config file.
//!
//! | Variable | Default |
//! |---|---|
//! | `HTTP_PORT` | `8080` |
//! | `DATABASE_URL` | `memory://` |
//! | `DB_MAX_CONNECTIONS` | `10` |
//! | `DB_ACQUIRE_TIMEOUT_SECS` | `5` |
//! | `JWT_SECRET` | required, at least 32 bytes |
//! | `JWT_EXPIRY_HOURS` | `24` |
//! | `JWT_ISSUER` | `tessera` |
//! | `TENANT_HEADER` | `x-tenant-id` |
//! | `RUST_LOG` | `info` |
//! | `LOG_FORMAT` | `compact` (`json` also accepted) |

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use http::HeaderName;

use crate::errors::{AppError, AppResult};

/// Default HTTP listen port
pub const DEFAULT_HTTP_PORT: u16 = 8080;
/// Default tenant selector header
pub const DEFAULT_TENANT_HEADER: &str = "x-tenant-id";
/// Minimum accepted JWT secret length in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Storage engine selected by `DATABASE_URL`
#[derive(Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// In-process engine (`memory://`)
    Memory,
    /// PostgreSQL server (`postgres://` or `postgresql://`)
    PostgreSQL {
        /// Full connection string
        connection_string: String,
    },
}

impl DatabaseUrl {
    /// Parse a database URL
    ///
    /// # Errors
    ///
    /// Returns a config error for unrecognized schemes
    pub fn parse_url(value: &str) -> AppResult<Self> {
        let value = value.trim();
        if value.is_empty() || value.starts_with("memory:") {
            return Ok(Self::Memory);
        }
        if value.starts_with("postgres://") || value.starts_with("postgresql://") {
            return Ok(Self::PostgreSQL {
                connection_string: value.to_owned(),
            });
        }
        Err(AppError::config(format!(
            "unsupported DATABASE_URL scheme: {}",
            value.split(':').next().unwrap_or_default()
        )))
    }

    /// Short engine name for logs
    #[must_use]
    pub const fn engine_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::PostgreSQL { .. } => "postgresql",
        }
    }
}

// Keep credentials out of logs.
impl fmt::Debug for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str("memory://"),
            Self::PostgreSQL { .. } => f.write_str("postgres://***"),
        }
    }
}

/// Connection pool and engine settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Engine selection
    pub url: DatabaseUrl,
    /// Maximum simultaneously checked-out connections
    pub max_connections: u32,
    /// How long `begin` waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DatabaseUrl::Memory,
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// JWT signing settings
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 shared secret
    pub jwt_secret: String,
    /// Token lifetime
    pub jwt_expiry_hours: i64,
    /// Issuer claim written and required on tokens
    pub issuer: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"***")
            .field("jwt_expiry_hours", &self.jwt_expiry_hours)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable single-line output
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(AppError::config(format!("unknown LOG_FORMAT: {other}"))),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `EnvFilter` directive string
    pub filter: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Compact,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Header carrying the tenant selector
    pub tenant_header: HeaderName,
    /// Database settings
    pub database: DatabaseConfig,
    /// JWT settings
    pub auth: AuthConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Load configuration from process environment variables
    ///
    /// # Errors
    ///
    /// Returns a config error if any variable is present but malformed, or if
    /// `JWT_SECRET` is missing or too short
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Same conditions as [`ServerConfig::from_env`]
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let http_port = parse_or(&lookup, "HTTP_PORT", DEFAULT_HTTP_PORT)?;

        let tenant_header = lookup("TENANT_HEADER")
            .unwrap_or_else(|| DEFAULT_TENANT_HEADER.to_owned());
        let tenant_header = HeaderName::from_str(tenant_header.trim().to_ascii_lowercase().as_str())
            .map_err(|e| AppError::config(format!("invalid TENANT_HEADER: {e}")))?;

        let database = DatabaseConfig {
            url: DatabaseUrl::parse_url(&lookup("DATABASE_URL").unwrap_or_default())?,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10_u32)?,
            acquire_timeout: Duration::from_secs(parse_or(
                &lookup,
                "DB_ACQUIRE_TIMEOUT_SECS",
                5_u64,
            )?),
        };
        if database.max_connections == 0 {
            return Err(AppError::config("DB_MAX_CONNECTIONS must be at least 1"));
        }

        let jwt_secret = lookup("JWT_SECRET")
            .ok_or_else(|| AppError::config("JWT_SECRET is required"))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(AppError::config(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"
            )));
        }
        let auth = AuthConfig {
            jwt_secret,
            jwt_expiry_hours: parse_or(&lookup, "JWT_EXPIRY_HOURS", 24_i64)?,
            issuer: lookup("JWT_ISSUER").unwrap_or_else(|| "tessera".to_owned()),
        };

        let logging = LoggingConfig {
            filter: lookup("RUST_LOG").unwrap_or_else(|| "info".to_owned()),
            format: lookup("LOG_FORMAT").unwrap_or_default().parse()?,
        };

        Ok(Self {
            http_port,
            tenant_header,
            database,
            auth,
            logging,
        })
    }

    /// In-process configuration with the given JWT secret and default everything else
    #[must_use]
    pub fn in_memory(jwt_secret: &str) -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            tenant_header: HeaderName::from_static(DEFAULT_TENANT_HEADER),
            database: DatabaseConfig::default(),
            auth: AuthConfig {
                jwt_secret: jwt_secret.to_owned(),
                jwt_expiry_hours: 24,
                issuer: "tessera".to_owned(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> AppResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::config(format!("invalid {key}={raw}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = ServerConfig::from_lookup(lookup_from(&[("JWT_SECRET", SECRET)])).unwrap();
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.tenant_header.as_str(), "x-tenant-id");
        assert_eq!(config.database.url, DatabaseUrl::Memory);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let config = ServerConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", SECRET),
            ("HTTP_PORT", "9090"),
            ("TENANT_HEADER", "X-Org"),
            ("DATABASE_URL", "postgres://app@localhost/tessera"),
            ("DB_MAX_CONNECTIONS", "3"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(config.http_port, 9090);
        assert_eq!(config.tenant_header.as_str(), "x-org");
        assert_eq!(config.database.url.engine_name(), "postgresql");
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_or_short_secret_is_rejected() {
        assert!(ServerConfig::from_lookup(lookup_from(&[])).is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[("JWT_SECRET", "short")])).is_err());
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(ServerConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", SECRET),
            ("HTTP_PORT", "eighty"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", SECRET),
            ("DATABASE_URL", "mysql://nope"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", SECRET),
            ("DB_MAX_CONNECTIONS", "0"),
        ]))
        .is_err());
    }

    #[test]
    fn database_url_debug_hides_credentials() {
        let url = DatabaseUrl::parse_url("postgres://user:hunter2@db/app").unwrap();
        assert!(!format!("{url:?}").contains("hunter2"));
    }
}

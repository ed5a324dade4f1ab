// ============================================================================
// Cache Backend Configuration
// ============================================================================

use crate::constants::{DEFAULT_CACHE_TIMEOUT_SECS, DEFAULT_SLOW_REQUEST_MS};
use crate::env::{ConfigError, EnvReader};
use crate::secret::SecureString;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Which cache implementation backs the cache proxy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Keyed cache: one hash per identifier holding type/source/payload
    Redis,
    /// Relational cache: one table row per identifier
    Postgres,
}

impl FromStr for CacheBackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackendKind::Redis),
            "postgres" | "postgresql" => Ok(CacheBackendKind::Postgres),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

impl fmt::Display for CacheBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheBackendKind::Redis => write!(f, "redis"),
            CacheBackendKind::Postgres => write!(f, "postgres"),
        }
    }
}

/// Credentials given as "user:password" or just "password"
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheCredentials {
    pub username: Option<String>,
    pub password: SecureString,
}

impl CacheCredentials {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((user, password)) if !user.is_empty() => Self {
                username: Some(user.to_string()),
                password: SecureString::from(password),
            },
            _ => Self {
                username: None,
                password: SecureString::from(raw),
            },
        }
    }
}

/// Cache backend connection settings
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,
    pub host: String,
    pub port: u16,
    pub credentials: CacheCredentials,
    /// Redis database index or PostgreSQL database name
    pub database: String,
    /// Cache table (relational backend only)
    pub table: Option<String>,
    /// Connect / request timeout enforced by the backend client
    pub timeout: Duration,
    /// Requests taking at least this long are reported as slow
    pub slow_request_threshold: Duration,
}

impl CacheConfig {
    pub(crate) fn from_reader(env: &EnvReader<'_>) -> Result<Self, ConfigError> {
        let backend = env.optional_parse("CACHE_BACKEND", CacheBackendKind::Redis)?;

        let table = env.optional("CACHE_TABLE");
        if backend == CacheBackendKind::Postgres {
            match &table {
                None => {
                    return Err(ConfigError::Missing {
                        name: EnvReader::full_name("CACHE_TABLE"),
                    });
                }
                Some(t) if !is_plain_identifier(t) => {
                    return Err(ConfigError::Invalid {
                        name: EnvReader::full_name("CACHE_TABLE"),
                        value: t.clone(),
                        reason: "must contain only letters, digits and underscores".to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        let database = env.required("CACHE_DATABASE")?;
        if backend == CacheBackendKind::Redis && database.parse::<i64>().is_err() {
            return Err(ConfigError::Invalid {
                name: EnvReader::full_name("CACHE_DATABASE"),
                value: database,
                reason: "redis database must be a number".to_string(),
            });
        }

        Ok(Self {
            backend,
            host: env.required("CACHE_HOST")?,
            port: env.required_parse("CACHE_PORT")?,
            credentials: CacheCredentials::parse(&env.required("CACHE_CREDENTIALS")?),
            database,
            table,
            timeout: Duration::from_secs(
                env.optional_parse("CACHE_TIMEOUT_SECS", DEFAULT_CACHE_TIMEOUT_SECS)?,
            ),
            slow_request_threshold: Duration::from_millis(
                env.optional_parse("SLOW_REQUEST_MS", DEFAULT_SLOW_REQUEST_MS)?,
            ),
        })
    }
}

/// SQL identifier check for the configured table name
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_with_user() {
        let creds = CacheCredentials::parse("reprocess:s3cret");
        assert_eq!(creds.username.as_deref(), Some("reprocess"));
        assert_eq!(creds.password.expose(), "s3cret");
    }

    #[test]
    fn test_credentials_password_only() {
        let creds = CacheCredentials::parse("s3cret");
        assert_eq!(creds.username, None);
        assert_eq!(creds.password.expose(), "s3cret");
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("REDIS".parse(), Ok(CacheBackendKind::Redis));
        assert_eq!("postgresql".parse(), Ok(CacheBackendKind::Postgres));
        assert!("memcached".parse::<CacheBackendKind>().is_err());
    }

    #[test]
    fn test_plain_identifier() {
        assert!(is_plain_identifier("source_cache"));
        assert!(!is_plain_identifier("cache; DROP TABLE x"));
        assert!(!is_plain_identifier("1cache"));
    }
}

//! Configuration loading and representation.
//!
//! Every section is a plain struct with sensible defaults. Values come from
//! environment variables through an injectable lookup function, so tests never
//! touch the process environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `DB_BACKEND` | `memory` (`memory` \| `postgres`) |
//! | `CASS_DB_HOST` | `localhost` (comma separated) |
//! | `CASS_DB_PORT` | `9042` |
//! | `CASS_DB_USER` / `CASS_DB_PASS` | empty |
//! | `CASS_DB_KEYSPACE` | `shop` |
//! | `DATABASE_URL` | required when `DB_BACKEND=postgres` |
//! | `DB_MAX_CONNECTIONS` | `5` |
//! | `PUBSUB_BACKEND` | `none` (`none` \| `memory` \| `redis`) |
//! | `PUBSUB_URL` | required when `PUBSUB_BACKEND=redis` |
//! | `PUBSUB_TOPIC` | `shop-events` |
//! | `PUBSUB_CONSUMER_GROUP` | `shopkit` |
//! | `PUBSUB_PARTITIONS` | `1` |
//! | `PUBSUB_AUTO_CREATE` | `false` |
//! | `DELETE_POLICY` | `idempotent` (`idempotent` \| `require-existing`) |

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: String, value: String },

    #[error("missing required setting {0}")]
    Missing(String),
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// What a delete of a non-existent key does.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum DeletePolicy {
    /// Succeed silently.
    #[default]
    Idempotent,
    /// Fail with `NotFound { id }`.
    RequireExisting,
}

impl FromStr for DeletePolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idempotent" => Ok(DeletePolicy::Idempotent),
            "require-existing" | "require_existing" | "strict" => Ok(DeletePolicy::RequireExisting),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum DbBackend {
    #[default]
    Memory,
    Postgres,
}

impl FromStr for DbBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(DbBackend::Memory),
            "postgres" | "postgresql" => Ok(DbBackend::Postgres),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PubSubBackend {
    /// No transport configured (`is_set() == false`).
    #[default]
    None,
    Memory,
    Redis,
}

impl FromStr for PubSubBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(PubSubBackend::None),
            "memory" | "in-memory" => Ok(PubSubBackend::Memory),
            "redis" => Ok(PubSubBackend::Redis),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub backend: DbBackend,
    pub hosts: Vec<String>,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub keyspace: String,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: DbBackend::Memory,
            hosts: vec!["localhost".to_string()],
            port: 9042,
            username: String::new(),
            password: String::new(),
            keyspace: "shop".to_string(),
            database_url: None,
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backend = parse_or(&lookup, "DB_BACKEND", defaults.backend)?;
        let hosts = match lookup("CASS_DB_HOST") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.hosts,
        };
        let database_url = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty());

        if backend == DbBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL".to_string()));
        }

        Ok(Self {
            backend,
            hosts,
            port: parse_or(&lookup, "CASS_DB_PORT", defaults.port)?,
            username: lookup("CASS_DB_USER").unwrap_or_default(),
            password: lookup("CASS_DB_PASS").unwrap_or_default(),
            keyspace: lookup("CASS_DB_KEYSPACE").unwrap_or(defaults.keyspace),
            database_url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?,
        })
    }

    /// Contact points as `host:port`.
    pub fn contact_points(&self) -> Vec<String> {
        self.hosts.iter().map(|h| format!("{h}:{}", self.port)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubConfig {
    pub backend: PubSubBackend,
    pub url: Option<String>,
    pub topic: String,
    pub consumer_group: String,
    pub partitions: u32,
    /// Create unknown topics on publish instead of failing with `NotFound`.
    pub auto_create: bool,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            backend: PubSubBackend::None,
            url: None,
            topic: "shop-events".to_string(),
            consumer_group: "shopkit".to_string(),
            partitions: 1,
            auto_create: false,
        }
    }
}

impl PubSubConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let backend = parse_or(&lookup, "PUBSUB_BACKEND", defaults.backend)?;
        let url = lookup("PUBSUB_URL").filter(|u| !u.trim().is_empty());
        if backend == PubSubBackend::Redis && url.is_none() {
            return Err(ConfigError::Missing("PUBSUB_URL".to_string()));
        }

        let partitions: u32 = parse_or(&lookup, "PUBSUB_PARTITIONS", defaults.partitions)?;
        if partitions == 0 {
            return Err(ConfigError::invalid("PUBSUB_PARTITIONS", "0"));
        }

        Ok(Self {
            backend,
            url,
            topic: lookup("PUBSUB_TOPIC").unwrap_or(defaults.topic),
            consumer_group: lookup("PUBSUB_CONSUMER_GROUP").unwrap_or(defaults.consumer_group),
            partitions,
            auto_create: parse_or(&lookup, "PUBSUB_AUTO_CREATE", defaults.auto_create)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub delete_policy: DeletePolicy,
}

impl StoreConfig {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            delete_policy: parse_or(&lookup, "DELETE_POLICY", DeletePolicy::default())?,
        })
    }
}

/// Lookup backed by the process environment.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::invalid(key, &raw)),
    }
}

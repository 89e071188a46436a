//! Process wiring: configuration → session, transport and handlers.
//!
//! The pub/sub contract is generic (not object-safe), so the configured
//! transport is carried as the [`Transport`] enum, which delegates every
//! operation to the selected backend. Sessions are object-safe and travel as
//! `Arc<dyn Session>`.

use std::sync::Arc;

use anyhow::Context as _;
use serde::Serialize;
use tracing::info;

use shopkit_core::DataResult;
use shopkit_events::{
    CommitFn, Headers, Health, InMemoryPubSub, Message, NullPubSub, PubSub, PublishOptions,
    SubscriptionState, TopicPartition,
};
#[cfg(feature = "redis")]
use shopkit_infra::event_bus::RedisStreamsPubSub;
use shopkit_infra::config::{env_lookup, DbBackend, PubSubBackend};
use shopkit_infra::{DatabaseConfig, InMemorySession, PubSubConfig, Session, StoreConfig};
use shopkit_observability::ObservabilityConfig;
use shopkit_shop::Shop;

use crate::context::Context;

/// Whole-process configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pubsub: PubSubConfig,
    pub store: StoreConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database: DatabaseConfig::from_lookup(&lookup).context("database configuration")?,
            pubsub: PubSubConfig::from_lookup(&lookup).context("pubsub configuration")?,
            store: StoreConfig::from_lookup(&lookup).context("store configuration")?,
            observability: ObservabilityConfig::from_lookup(&lookup),
        })
    }
}

/// The configured pub/sub backend.
#[derive(Debug)]
pub enum Transport {
    None(NullPubSub),
    Memory(InMemoryPubSub),
    #[cfg(feature = "redis")]
    Redis(RedisStreamsPubSub),
}

macro_rules! delegate {
    ($self:ident, $t:ident => $e:expr) => {
        match $self {
            Transport::None($t) => $e,
            Transport::Memory($t) => $e,
            #[cfg(feature = "redis")]
            Transport::Redis($t) => $e,
        }
    };
}

impl PubSub for Transport {
    fn publish_event_with_options<P>(
        &self,
        topic: &str,
        payload: &P,
        headers: &Headers,
        options: &PublishOptions,
    ) -> DataResult<()>
    where
        P: Serialize + ?Sized,
    {
        delegate!(self, t => t.publish_event_with_options(topic, payload, headers, options))
    }

    fn subscribe(&self) -> DataResult<Message> {
        delegate!(self, t => t.subscribe())
    }

    fn subscribe_with_commit(&self, commit: CommitFn<'_>) -> DataResult<Message> {
        delegate!(self, t => t.subscribe_with_commit(commit))
    }

    fn ping(&self) -> DataResult<()> {
        delegate!(self, t => t.ping())
    }

    fn health_check(&self) -> Health {
        delegate!(self, t => t.health_check())
    }

    fn is_set(&self) -> bool {
        delegate!(self, t => t.is_set())
    }

    fn commit_offset(&self, marker: TopicPartition) {
        delegate!(self, t => t.commit_offset(marker))
    }

    fn state(&self) -> SubscriptionState {
        delegate!(self, t => t.state())
    }

    fn close(&self) {
        delegate!(self, t => t.close())
    }
}

/// Open the configured database session, creating the shop table in memory.
pub fn build_session(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn Session>> {
    match config.backend {
        DbBackend::Memory => {
            let session = InMemorySession::new();
            session
                .create_table_for::<Shop>()
                .context("creating in-memory shop table")?;
            info!(backend = "memory", "database session ready");
            Ok(Arc::new(session))
        }
        #[cfg(feature = "postgres")]
        DbBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let session = shopkit_infra::db::PostgresSession::connect(url, config.max_connections)
                .context("connecting to postgres")?;
            info!(backend = "postgres", "database session ready");
            Ok(Arc::new(session))
        }
        #[cfg(not(feature = "postgres"))]
        DbBackend::Postgres => anyhow::bail!("DB_BACKEND=postgres requires the `postgres` feature"),
    }
}

/// Build the configured transport.
pub fn build_pubsub(config: &PubSubConfig) -> anyhow::Result<Arc<Transport>> {
    let transport = match config.backend {
        PubSubBackend::None => Transport::None(NullPubSub),
        PubSubBackend::Memory => Transport::Memory(InMemoryPubSub::new(&config.topic, config.partitions)),
        #[cfg(feature = "redis")]
        PubSubBackend::Redis => {
            let url = config
                .url
                .as_deref()
                .context("PUBSUB_URL is required for the redis backend")?;
            let bus = RedisStreamsPubSub::new(url, &config.topic, &config.consumer_group)
                .context("opening redis client")?
                .with_auto_create(config.auto_create);
            bus.ensure_consumer_group()
                .context("creating redis consumer group")?;
            Transport::Redis(bus)
        }
        #[cfg(not(feature = "redis"))]
        PubSubBackend::Redis => anyhow::bail!("PUBSUB_BACKEND=redis requires the `redis` feature"),
    };

    info!(backend = ?config.backend, topic = %config.topic, is_set = transport.is_set(), "pubsub ready");
    Ok(Arc::new(transport))
}

/// Fully wired application handles.
pub struct App {
    pub config: AppConfig,
    pub session: Arc<dyn Session>,
    pub pubsub: Arc<Transport>,
}

impl App {
    pub fn build(config: AppConfig) -> anyhow::Result<Self> {
        let session = build_session(&config.database)?;
        let pubsub = build_pubsub(&config.pubsub)?;
        Ok(Self {
            config,
            session,
            pubsub,
        })
    }

    /// Fresh per-request context over the shared handles.
    pub fn context(&self) -> Context<dyn Session, Transport> {
        Context::new(self.session.clone(), self.pubsub.clone())
    }
}

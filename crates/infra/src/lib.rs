//! Infrastructure layer: database sessions, record store, transports, config.

pub mod config;
pub mod db;
pub mod event_bus;
pub mod record_store;
pub mod workers;

mod integration_tests;

pub use config::{ConfigError, DatabaseConfig, DeletePolicy, PubSubConfig, StoreConfig};
pub use db::{InMemorySession, QueryResult, Session, SessionError, Statement};
pub use record_store::{parse_key, RecordStore};
pub use workers::{SubscriberWorker, WorkerHandle};

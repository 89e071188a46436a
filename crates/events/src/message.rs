use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopkit_core::{DataError, DataResult};

/// String headers attached to a published message.
pub type Headers = BTreeMap<String, String>;

/// Position of a message inside a topic partition.
///
/// Opaque to callers: it is only ever handed back to the channel that produced
/// it (through [`TopicPartition`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Offset {
    /// Dense, zero-based sequence (in-memory broker).
    Sequence(u64),
    /// Broker-assigned entry id (e.g. a Redis stream id `1700000000000-0`).
    Stream(String),
}

impl core::fmt::Display for Offset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Offset::Sequence(n) => write!(f, "{n}"),
            Offset::Stream(id) => f.write_str(id),
        }
    }
}

/// Commit marker: "everything up to and including `offset` is consumed".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: u32,
    pub offset: Offset,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: u32, offset: Offset) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
        }
    }
}

/// Per-publish delivery tuning.
///
/// `PublishOptions::default()` is exactly what the no-options publish uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    /// Routing key; messages with the same key land on the same partition.
    pub key: Option<String>,
    /// Explicit partition, overriding key routing. Must exist.
    pub partition: Option<u32>,
    /// Producer timestamp; defaults to the time of the publish call.
    pub timestamp: Option<DateTime<Utc>>,
}

impl PublishOptions {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn with_partition(partition: u32) -> Self {
        Self {
            partition: Some(partition),
            ..Self::default()
        }
    }
}

/// A message delivered by a subscription.
///
/// The channel never keeps a reference to it after handing it out; the
/// subscriber owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub topic: String,
    pub partition: u32,
    pub offset: Offset,
    pub key: Option<String>,
    /// Serialized payload bytes (JSON).
    pub value: Vec<u8>,
    pub headers: Headers,
    pub published_at: DateTime<Utc>,
}

impl Message {
    /// Decode the payload into `T`.
    pub fn bind<T: DeserializeOwned>(&self) -> DataResult<T> {
        serde_json::from_slice(&self.value)
            .map_err(|e| DataError::deserialization(format!("message {}: {e}", self.id)))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Commit marker for this message.
    pub fn marker(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition, self.offset.clone())
    }
}

//! Commit offset persistence.
//!
//! Tracks the last consumed position per (topic, partition) for one consumer
//! group. Writes are last-write-wins; there is no monotonicity check, so a
//! rewind is just another commit.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::message::{Offset, TopicPartition};

/// Committed-offset store for a consumer group.
pub trait OffsetStore: Send + Sync {
    /// Last committed offset for a topic partition, if any.
    fn committed(&self, topic: &str, partition: u32) -> Option<Offset>;

    /// Record `marker` as the committed position (last write wins).
    fn commit(&self, marker: TopicPartition);

    /// Forget every committed offset of a topic (replay from the start).
    fn clear(&self, topic: &str);
}

impl<S> OffsetStore for Arc<S>
where
    S: OffsetStore + ?Sized,
{
    fn committed(&self, topic: &str, partition: u32) -> Option<Offset> {
        (**self).committed(topic, partition)
    }

    fn commit(&self, marker: TopicPartition) {
        (**self).commit(marker)
    }

    fn clear(&self, topic: &str) {
        (**self).clear(topic)
    }
}

/// In-memory offset store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOffsetStore {
    inner: RwLock<HashMap<(String, u32), Offset>>,
}

impl InMemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OffsetStore for InMemoryOffsetStore {
    fn committed(&self, topic: &str, partition: u32) -> Option<Offset> {
        let map = self.inner.read().ok()?;
        map.get(&(topic.to_string(), partition)).cloned()
    }

    fn commit(&self, marker: TopicPartition) {
        if let Ok(mut map) = self.inner.write() {
            map.insert((marker.topic, marker.partition), marker.offset);
        }
    }

    fn clear(&self, topic: &str) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|(t, _), _| t != topic);
        }
    }
}

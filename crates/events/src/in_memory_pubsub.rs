//! In-memory partitioned broker for tests/dev.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use shopkit_core::{DataError, DataResult};

use crate::health::Health;
use crate::message::{Headers, Message, Offset, PublishOptions, TopicPartition};
use crate::offsets::{InMemoryOffsetStore, OffsetStore};
use crate::pubsub::{CommitFn, PubSub, SubscriptionState};

/// Delivery state of one attached channel.
#[derive(Debug)]
struct Consumer {
    /// Next offset to hand out, per partition of the subscribed topic.
    positions: HashMap<u32, u64>,
    lifecycle: SubscriptionState,
    /// Partition the next scan starts from.
    cursor: u32,
}

#[derive(Debug)]
struct Broker {
    /// topic -> partitions -> append-only log
    topics: HashMap<String, Vec<Vec<Message>>>,
    consumers: HashMap<u64, Consumer>,
    next_consumer: u64,
    reachable: bool,
}

impl Broker {
    fn lifecycle(&self, id: u64) -> SubscriptionState {
        self.consumers
            .get(&id)
            .map_or(SubscriptionState::Closed, |c| c.lifecycle)
    }
}

/// Topic logs and committed offsets shared by every channel attached to them.
struct Shared {
    broker: Mutex<Broker>,
    available: Condvar,
    offsets: Arc<dyn OffsetStore>,
    next_partition: AtomicU32,
}

/// In-memory pub/sub channel with one consumer group.
///
/// - Topics are created explicitly and have a fixed partition count
/// - Routing: explicit partition, else stable hash of the key, else round-robin
/// - The channel consumes a single topic (chosen at construction)
/// - Delivery position and committed offset are tracked separately; see
///   [`InMemoryPubSub::seek_to_committed`] and [`InMemoryPubSub::reconnect`]
pub struct InMemoryPubSub {
    topic: String,
    id: u64,
    shared: Arc<Shared>,
}

impl core::fmt::Debug for InMemoryPubSub {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryPubSub")
            .field("topic", &self.topic)
            .field("consumer", &self.id)
            .finish_non_exhaustive()
    }
}

impl InMemoryPubSub {
    /// Create a channel consuming `topic`, which is created with `partitions`
    /// partitions (at least one).
    pub fn new(topic: impl Into<String>, partitions: u32) -> Self {
        let topic = topic.into();
        let mut topics = HashMap::new();
        topics.insert(topic.clone(), vec![Vec::new(); partitions.max(1) as usize]);

        let shared = Arc::new(Shared {
            broker: Mutex::new(Broker {
                topics,
                consumers: HashMap::new(),
                next_consumer: 0,
                reachable: true,
            }),
            available: Condvar::new(),
            offsets: Arc::new(InMemoryOffsetStore::new()),
            next_partition: AtomicU32::new(0),
        });
        Self::attach(topic, shared)
    }

    /// Open another channel on the same topic logs and offset store, positioned
    /// at the committed offsets, as a restarted consumer would be.
    ///
    /// This channel is left untouched; uncommitted messages are delivered
    /// again on the new one.
    pub fn reconnect(&self) -> Self {
        Self::attach(self.topic.clone(), self.shared.clone())
    }

    fn attach(topic: String, shared: Arc<Shared>) -> Self {
        let id = match shared.broker.lock() {
            Ok(mut broker) => {
                let id = broker.next_consumer;
                broker.next_consumer += 1;
                broker.consumers.insert(
                    id,
                    Consumer {
                        positions: HashMap::new(),
                        lifecycle: SubscriptionState::Configured,
                        cursor: 0,
                    },
                );
                id
            }
            // A poisoned broker leaves the channel detached, which reads as closed.
            Err(_) => u64::MAX,
        };

        let channel = Self { topic, id, shared };
        channel.seek_to_committed();
        channel
    }

    /// Topic this channel subscribes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Create another topic (idempotent; an existing topic keeps its partitions).
    pub fn create_topic(&self, name: impl Into<String>, partitions: u32) {
        if let Ok(mut broker) = self.shared.broker.lock() {
            broker
                .topics
                .entry(name.into())
                .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
        }
    }

    /// Simulate the transport becoming (un)reachable.
    pub fn set_reachable(&self, reachable: bool) {
        if let Ok(mut broker) = self.shared.broker.lock() {
            broker.reachable = reachable;
        }
    }

    /// Rewind delivery to the committed offsets, as a restarted consumer would.
    ///
    /// Messages handed out but never committed are delivered again.
    pub fn seek_to_committed(&self) {
        let Ok(mut broker) = self.shared.broker.lock() else {
            return;
        };
        let partitions = broker.topics.get(&self.topic).map_or(0, Vec::len) as u32;
        let positions = (0..partitions)
            .map(|p| (p, self.committed_next(p)))
            .collect();
        if let Some(consumer) = broker.consumers.get_mut(&self.id) {
            consumer.positions = positions;
        }
        drop(broker);

        self.shared.available.notify_all();
    }

    /// Like [`PubSub::subscribe`] but gives up after `timeout`, returning `Ok(None)`.
    pub fn subscribe_timeout(&self, timeout: Duration) -> DataResult<Option<Message>> {
        let msg = self.next_message(Some(Instant::now() + timeout))?;
        if let Some(m) = &msg {
            self.commit_offset(m.marker());
        }
        Ok(msg)
    }

    /// Messages published but not yet committed on the subscribed topic.
    pub fn lag(&self) -> u64 {
        let Ok(broker) = self.shared.broker.lock() else {
            return 0;
        };
        self.lag_locked(&broker)
    }

    fn lag_locked(&self, broker: &Broker) -> u64 {
        let Some(partitions) = broker.topics.get(&self.topic) else {
            return 0;
        };
        partitions
            .iter()
            .enumerate()
            .map(|(p, log)| (log.len() as u64).saturating_sub(self.committed_next(p as u32)))
            .sum()
    }

    /// Offset following the committed one (0 when nothing was committed).
    fn committed_next(&self, partition: u32) -> u64 {
        match self.shared.offsets.committed(&self.topic, partition) {
            Some(Offset::Sequence(n)) => n + 1,
            _ => 0,
        }
    }

    fn lock(&self) -> DataResult<MutexGuard<'_, Broker>> {
        self.shared
            .broker
            .lock()
            .map_err(|_| DataError::connection("broker lock poisoned"))
    }

    fn route(&self, partitions: u32, options: &PublishOptions) -> u32 {
        match &options.key {
            Some(key) => fnv1a(key.as_bytes()) % partitions,
            None => self.shared.next_partition.fetch_add(1, Ordering::Relaxed) % partitions,
        }
    }

    /// Park until a message is available on the subscribed topic, the deadline
    /// passes (`Ok(None)`), or the channel closes.
    fn next_message(&self, deadline: Option<Instant>) -> DataResult<Option<Message>> {
        let mut broker = self.lock()?;

        loop {
            let Broker {
                topics, consumers, ..
            } = &mut *broker;
            let consumer = consumers
                .get_mut(&self.id)
                .ok_or_else(|| DataError::connection("subscription closed"))?;

            if consumer.lifecycle == SubscriptionState::Closed {
                return Err(DataError::connection("subscription closed"));
            }
            if consumer.lifecycle == SubscriptionState::Configured {
                consumer.lifecycle = SubscriptionState::Subscribed;
            }

            if let Some(msg) = topics
                .get(&self.topic)
                .and_then(|partitions| Self::take_next(consumer, partitions))
            {
                consumer.lifecycle = SubscriptionState::Delivering;
                return Ok(Some(msg));
            }

            broker = match deadline {
                None => self
                    .shared
                    .available
                    .wait(broker)
                    .map_err(|_| DataError::connection("broker lock poisoned"))?,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.shared
                        .available
                        .wait_timeout(broker, deadline - now)
                        .map_err(|_| DataError::connection("broker lock poisoned"))?
                        .0
                }
            };
        }
    }

    /// Hand out the next message, scanning partitions from the consumer's
    /// cursor so a busy partition cannot starve the others.
    fn take_next(consumer: &mut Consumer, partitions: &[Vec<Message>]) -> Option<Message> {
        let count = partitions.len() as u32;
        if count == 0 {
            return None;
        }

        for step in 0..count {
            let p = (consumer.cursor + step) % count;
            let position = consumer.positions.entry(p).or_insert(0);
            if let Some(msg) = partitions[p as usize].get(*position as usize) {
                *position += 1;
                consumer.cursor = (p + 1) % count;
                return Some(msg.clone());
            }
        }
        None
    }

    fn set_lifecycle(&self, from: SubscriptionState, to: SubscriptionState) {
        if let Ok(mut broker) = self.shared.broker.lock() {
            if let Some(consumer) = broker.consumers.get_mut(&self.id) {
                if consumer.lifecycle == from {
                    consumer.lifecycle = to;
                }
            }
        }
    }
}

impl Drop for InMemoryPubSub {
    fn drop(&mut self) {
        if let Ok(mut broker) = self.shared.broker.lock() {
            broker.consumers.remove(&self.id);
        }
    }
}

impl PubSub for InMemoryPubSub {
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
        let value = serde_json::to_vec(payload).map_err(|e| {
            DataError::deserialization(format!("payload serialization failed: {e}"))
        })?;

        let mut broker = self.lock()?;
        if broker.lifecycle(self.id) == SubscriptionState::Closed {
            return Err(DataError::connection("channel closed"));
        }
        if !broker.reachable {
            return Err(DataError::connection("transport unreachable"));
        }

        let partition_count = broker
            .topics
            .get(topic)
            .map(|p| p.len() as u32)
            .ok_or_else(|| DataError::not_found(topic))?;

        let partition = match options.partition {
            Some(p) if p >= partition_count => {
                return Err(DataError::not_found(format!("{topic}/{p}")));
            }
            Some(p) => p,
            None => self.route(partition_count, options),
        };

        let log = broker
            .topics
            .get_mut(topic)
            .and_then(|parts| parts.get_mut(partition as usize))
            .ok_or_else(|| DataError::not_found(format!("{topic}/{partition}")))?;

        let offset = log.len() as u64;
        log.push(Message {
            id: Uuid::now_v7(),
            topic: topic.to_string(),
            partition,
            offset: Offset::Sequence(offset),
            key: options.key.clone(),
            value,
            headers: headers.clone(),
            published_at: options.timestamp.unwrap_or_else(Utc::now),
        });
        drop(broker);

        debug!(topic, partition, offset, "message published");
        self.shared.available.notify_all();
        Ok(())
    }

    fn subscribe(&self) -> DataResult<Message> {
        let msg = self
            .next_message(None)?
            .ok_or_else(|| DataError::connection("subscription closed"))?;
        self.commit_offset(msg.marker());
        Ok(msg)
    }

    fn subscribe_with_commit(&self, commit: CommitFn<'_>) -> DataResult<Message> {
        let msg = self
            .next_message(None)?
            .ok_or_else(|| DataError::connection("subscription closed"))?;

        self.set_lifecycle(SubscriptionState::Delivering, SubscriptionState::AwaitingCommit);
        if commit(&msg) {
            self.commit_offset(msg.marker());
        } else {
            debug!(topic = %msg.topic, partition = msg.partition, offset = %msg.offset, "message left uncommitted");
        }
        self.set_lifecycle(SubscriptionState::AwaitingCommit, SubscriptionState::Delivering);

        Ok(msg)
    }

    fn ping(&self) -> DataResult<()> {
        let broker = self.lock()?;
        if broker.lifecycle(self.id) == SubscriptionState::Closed {
            return Err(DataError::connection("channel closed"));
        }
        if !broker.reachable {
            return Err(DataError::connection("transport unreachable"));
        }
        Ok(())
    }

    fn health_check(&self) -> Health {
        let Ok(broker) = self.shared.broker.lock() else {
            return Health::down("memory").detail("error", "broker lock poisoned");
        };

        let healthy = broker.reachable && broker.lifecycle(self.id) != SubscriptionState::Closed;
        let health = if healthy {
            Health::up("memory")
        } else {
            Health::down("memory")
        };

        health
            .detail("topic", self.topic.clone())
            .detail("topics", broker.topics.len())
            .detail(
                "partitions",
                broker.topics.get(&self.topic).map_or(0, Vec::len),
            )
            .detail("lag", self.lag_locked(&broker))
            .detail("state", broker.lifecycle(self.id).as_str())
    }

    fn is_set(&self) -> bool {
        true
    }

    fn state(&self) -> SubscriptionState {
        self.shared
            .broker
            .lock()
            .map(|b| b.lifecycle(self.id))
            .unwrap_or(SubscriptionState::Closed)
    }

    fn commit_offset(&self, marker: TopicPartition) {
        let Ok(broker) = self.shared.broker.lock() else {
            warn!(topic = %marker.topic, "offset commit skipped: broker lock poisoned");
            return;
        };

        let known = match (&marker.offset, broker.topics.get(&marker.topic)) {
            (Offset::Sequence(n), Some(parts)) => parts
                .get(marker.partition as usize)
                .is_some_and(|log| (*n as usize) < log.len()),
            _ => false,
        };
        drop(broker);

        if !known {
            warn!(
                topic = %marker.topic,
                partition = marker.partition,
                offset = %marker.offset,
                "offset commit ignored: unknown position"
            );
            return;
        }

        self.shared.offsets.commit(marker);
    }

    fn close(&self) {
        if let Ok(mut broker) = self.shared.broker.lock() {
            if let Some(consumer) = broker.consumers.get_mut(&self.id) {
                consumer.lifecycle = SubscriptionState::Closed;
            }
        }
        self.shared.available.notify_all();
    }
}

/// 32-bit FNV-1a: stable across processes, unlike `DefaultHasher`.
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

//! Redis Streams-backed pub/sub channel (durable, at-least-once delivery).
//!
//! This implementation uses Redis Streams (XADD/XREADGROUP/XACK) to provide:
//! - **Durable delivery**: entries persist until acknowledged
//! - **At-least-once**: entries left pending are redelivered after a restart
//! - **Consumer groups**: every channel reads through one named group
//!
//! ## Architecture
//!
//! - **Stream Key**: one stream per topic (the stream key *is* the topic name)
//! - **Partitions**: a stream is a single ordered log, so every topic exposes
//!   exactly one partition (`0`)
//! - **Offsets**: Redis entry ids (`Offset::Stream("1700000000000-0")`);
//!   committing a marker is an `XACK`
//! - **Recovery**: the first read after construction drains this consumer's
//!   pending entries (`XREADGROUP .. 0`) before asking for new ones (`>`)

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use shopkit_core::{DataError, DataResult};
use shopkit_events::{
    CommitFn, Headers, Health, Message, Offset, PubSub, PublishOptions, SubscriptionState, TopicPartition,
};

/// Default XREADGROUP block time; bounds how long `close()` takes to be observed.
const DEFAULT_BLOCK_MS: u64 = 500;

/// Prefix marking header fields inside a stream entry.
const HEADER_PREFIX: &str = "h:";

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),
}

impl From<RedisStreamsError> for DataError {
    fn from(err: RedisStreamsError) -> Self {
        match err {
            RedisStreamsError::Connection(msg)
            | RedisStreamsError::Command(msg)
            | RedisStreamsError::ConsumerGroup(msg) => DataError::connection(msg),
            RedisStreamsError::Serialization(msg) | RedisStreamsError::Deserialization(msg) => {
                DataError::deserialization(msg)
            }
        }
    }
}

/// Redis Streams pub/sub channel consuming one topic through a consumer group.
#[derive(Debug)]
pub struct RedisStreamsPubSub {
    client: redis::Client,
    topic: String,
    group: String,
    consumer: String,
    auto_create: bool,
    block_ms: u64,
    /// Pending-list read position while recovering; `None` once drained.
    recovery_cursor: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl RedisStreamsPubSub {
    /// Create a channel on `redis_url` consuming `topic` as a member of `group`.
    ///
    /// The consumer name is unique per instance (`consumer-<uuid>`).
    pub fn new(
        redis_url: impl AsRef<str>,
        topic: impl Into<String>,
        group: impl Into<String>,
    ) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            topic: topic.into(),
            group: group.into(),
            consumer: format!("consumer-{}", Uuid::now_v7()),
            auto_create: false,
            block_ms: DEFAULT_BLOCK_MS,
            recovery_cursor: Mutex::new(Some("0".to_string())),
            closed: AtomicBool::new(false),
        })
    }

    /// Use a stable consumer name (so pending entries survive a restart).
    pub fn with_consumer_name(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Publish to unknown topics instead of failing with `NotFound`.
    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    pub fn with_block_ms(mut self, block_ms: u64) -> Self {
        self.block_ms = block_ms.max(1);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Ensure the consumer group exists on the consumed topic (idempotent).
    ///
    /// `MKSTREAM` creates the stream when it does not exist yet, which also
    /// makes the topic known to publishers.
    pub fn ensure_consumer_group(&self) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection()?;

        let created: redis::RedisResult<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.topic)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query(&mut conn);

        match created {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(RedisStreamsError::ConsumerGroup(format!(
                "XGROUP CREATE {} {} failed: {e}",
                self.topic, self.group
            ))),
        }
    }

    fn connection(&self) -> Result<redis::Connection, RedisStreamsError> {
        self.client
            .get_connection()
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    fn ensure_open(&self) -> DataResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DataError::connection("subscription closed"));
        }
        Ok(())
    }

    fn acknowledge(&self, topic: &str, entry_id: &str) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection()?;
        let _: u64 = redis::cmd("XACK")
            .arg(topic)
            .arg(&self.group)
            .arg(entry_id)
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XACK failed: {e}")))?;
        Ok(())
    }

    /// Block until one entry is available or the channel closes.
    fn next_message(&self) -> DataResult<Message> {
        self.ensure_consumer_group()?;
        let mut conn = self.connection()?;

        loop {
            self.ensure_open()?;

            if let Some(msg) = self.recover_pending(&mut conn)? {
                return Ok(msg);
            }

            if let Some(msg) = self.read_group(&mut conn, ">", Some(self.block_ms))? {
                return Ok(msg);
            }
        }
    }

    /// Next entry left pending by an earlier run of this consumer, if any.
    ///
    /// Each pending entry is handed out once per run; the cursor moves past it
    /// whether or not it gets acknowledged this time.
    fn recover_pending(&self, conn: &mut redis::Connection) -> DataResult<Option<Message>> {
        let mut cursor = self
            .recovery_cursor
            .lock()
            .map_err(|_| DataError::connection("recovery cursor lock poisoned"))?;
        let Some(from) = cursor.clone() else {
            return Ok(None);
        };

        match self.read_group(conn, &from, None)? {
            Some(msg) => {
                *cursor = Some(msg.offset.to_string());
                Ok(Some(msg))
            }
            None => {
                *cursor = None;
                debug!(topic = %self.topic, consumer = %self.consumer, "pending entries drained");
                Ok(None)
            }
        }
    }

    /// `XREADGROUP GROUP g c COUNT 1 [BLOCK ms] STREAMS topic <from>`.
    fn read_group(
        &self,
        conn: &mut redis::Connection,
        from: &str,
        block_ms: Option<u64>,
    ) -> Result<Option<Message>, RedisStreamsError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("STREAMS").arg(&self.topic).arg(from);

        let reply: redis::Value = cmd
            .query(conn)
            .map_err(|e| RedisStreamsError::Command(format!("XREADGROUP failed: {e}")))?;

        parse_read_reply(&self.topic, reply)
    }
}

impl PubSub for RedisStreamsPubSub {
    #[instrument(skip(self, payload, headers, options), fields(topic = %topic, key = ?options.key), err)]
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
        self.ensure_open()?;
        if let Some(p) = options.partition.filter(|p| *p != 0) {
            return Err(DataError::not_found(format!("{topic}/{p}")));
        }

        let payload = serde_json::to_string(payload)
            .map_err(|e| RedisStreamsError::Serialization(e.to_string()))?;
        let mut conn = self.connection()?;

        if !self.auto_create {
            let exists: bool = redis::cmd("EXISTS")
                .arg(topic)
                .query(&mut conn)
                .map_err(|e| RedisStreamsError::Command(format!("EXISTS failed: {e}")))?;
            if !exists {
                return Err(DataError::not_found(topic));
            }
        }

        let published_at = options.timestamp.unwrap_or_else(Utc::now);
        let mut cmd = redis::cmd("XADD");
        cmd.arg(topic)
            .arg("*")
            .arg("id")
            .arg(Uuid::now_v7().to_string())
            .arg("published_at")
            .arg(published_at.to_rfc3339());
        if let Some(key) = &options.key {
            cmd.arg("key").arg(key);
        }
        for (name, value) in headers {
            cmd.arg(format!("{HEADER_PREFIX}{name}")).arg(value);
        }
        cmd.arg("payload").arg(&payload);

        let entry_id: String = cmd
            .query(&mut conn)
            .map_err(|e| RedisStreamsError::Command(format!("XADD failed: {e}")))?;

        debug!(topic, entry_id = %entry_id, "entry appended");
        Ok(())
    }

    fn subscribe(&self) -> DataResult<Message> {
        let msg = self.next_message()?;
        self.commit_offset(msg.marker());
        Ok(msg)
    }

    fn subscribe_with_commit(&self, commit: CommitFn<'_>) -> DataResult<Message> {
        let msg = self.next_message()?;
        if commit(&msg) {
            self.commit_offset(msg.marker());
        } else {
            debug!(topic = %msg.topic, entry_id = %msg.offset, "entry left pending");
        }
        Ok(msg)
    }

    fn ping(&self) -> DataResult<()> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING")
            .query(&mut conn)
            .map_err(|e| DataError::connection(format!("PING failed: {e}")))?;
        Ok(())
    }

    fn health_check(&self) -> Health {
        let health = match self.ping() {
            Ok(()) => Health::up("redis-streams"),
            Err(e) => Health::down("redis-streams").detail("error", e.to_string()),
        };
        health
            .detail("topic", self.topic.clone())
            .detail("group", self.group.clone())
            .detail("consumer", self.consumer.clone())
    }

    fn is_set(&self) -> bool {
        true
    }

    fn commit_offset(&self, marker: TopicPartition) {
        let Offset::Stream(entry_id) = &marker.offset else {
            warn!(topic = %marker.topic, offset = %marker.offset, "ignoring non-stream offset");
            return;
        };
        if let Err(e) = self.acknowledge(&marker.topic, entry_id) {
            error!(topic = %marker.topic, entry_id = %entry_id, error = %e, "failed to acknowledge entry");
        }
    }

    fn state(&self) -> SubscriptionState {
        if self.closed.load(Ordering::SeqCst) {
            SubscriptionState::Closed
        } else {
            SubscriptionState::Configured
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Parse an `XREADGROUP` reply holding at most one entry.
///
/// Reply format: `[[stream, [[id, [field, value, ...]], ...]]]`, or nil on timeout.
fn parse_read_reply(topic: &str, reply: redis::Value) -> Result<Option<Message>, RedisStreamsError> {
    let streams = match reply {
        redis::Value::Nil => return Ok(None),
        redis::Value::Bulk(streams) => streams,
        _ => return Err(RedisStreamsError::Deserialization("Invalid reply format".to_string())),
    };

    for stream in streams {
        let redis::Value::Bulk(parts) = stream else {
            return Err(RedisStreamsError::Deserialization("Invalid stream format".to_string()));
        };
        let Some(redis::Value::Bulk(entries)) = parts.into_iter().nth(1) else {
            return Err(RedisStreamsError::Deserialization("Missing stream entries".to_string()));
        };
        if let Some(entry) = entries.into_iter().next() {
            return parse_stream_entry(topic, entry);
        }
    }
    Ok(None)
}

/// Parse one stream entry into a [`Message`].
///
/// A pending-list entry whose body was trimmed comes back with a nil field
/// list; it is reported as `Ok(None)`.
fn parse_stream_entry(topic: &str, entry: redis::Value) -> Result<Option<Message>, RedisStreamsError> {
    let redis::Value::Bulk(mut entry_vec) = entry else {
        return Err(RedisStreamsError::Deserialization("Invalid entry format".to_string()));
    };
    if entry_vec.len() < 2 {
        return Err(RedisStreamsError::Deserialization("Entry too short".to_string()));
    }

    let body = entry_vec.pop();
    let entry_id = match entry_vec.pop() {
        Some(redis::Value::Data(data)) => String::from_utf8_lossy(&data).to_string(),
        _ => return Err(RedisStreamsError::Deserialization("Invalid entry id format".to_string())),
    };

    let fields_vec = match body {
        Some(redis::Value::Bulk(v)) => v,
        Some(redis::Value::Nil) => return Ok(None),
        _ => return Err(RedisStreamsError::Deserialization("Invalid fields format".to_string())),
    };

    let mut fields = HashMap::new();
    for chunk in fields_vec.chunks(2) {
        if let [redis::Value::Data(key), redis::Value::Data(value)] = chunk {
            fields.insert(
                String::from_utf8_lossy(key).to_string(),
                String::from_utf8_lossy(value).to_string(),
            );
        }
    }

    let payload = fields
        .remove("payload")
        .ok_or_else(|| RedisStreamsError::Deserialization("Missing payload field".to_string()))?;
    let id = fields
        .get("id")
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::now_v7);
    let published_at = fields
        .get("published_at")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let headers: Headers = fields
        .iter()
        .filter_map(|(k, v)| {
            k.strip_prefix(HEADER_PREFIX)
                .map(|name| (name.to_string(), v.clone()))
        })
        .collect();

    Ok(Some(Message {
        id,
        topic: topic.to_string(),
        partition: 0,
        offset: Offset::Stream(entry_id),
        key: fields.remove("key"),
        value: payload.into_bytes(),
        headers,
        published_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> redis::Value {
        redis::Value::Data(s.as_bytes().to_vec())
    }

    fn entry(id: &str, fields: &[(&str, &str)]) -> redis::Value {
        let body = fields.iter().flat_map(|(k, v)| [data(k), data(v)]).collect();
        redis::Value::Bulk(vec![data(id), redis::Value::Bulk(body)])
    }

    fn reply(entries: Vec<redis::Value>) -> redis::Value {
        redis::Value::Bulk(vec![redis::Value::Bulk(vec![
            data("shop-events"),
            redis::Value::Bulk(entries),
        ])])
    }

    #[test]
    fn nil_reply_is_a_timeout() {
        assert_eq!(parse_read_reply("shop-events", redis::Value::Nil).unwrap(), None);
    }

    #[test]
    fn empty_pending_list_yields_nothing() {
        assert_eq!(parse_read_reply("shop-events", reply(vec![])).unwrap(), None);
    }

    #[test]
    fn parses_entry_fields_into_a_message() {
        let msg = parse_read_reply(
            "shop-events",
            reply(vec![entry(
                "1700000000000-0",
                &[
                    ("published_at", "2024-01-01T00:00:00+00:00"),
                    ("key", "123"),
                    ("h:source", "producer"),
                    ("payload", r#"{"id":"123"}"#),
                ],
            )]),
        )
        .unwrap()
        .unwrap();

        assert_eq!(msg.offset, Offset::Stream("1700000000000-0".into()));
        assert_eq!(msg.partition, 0);
        assert_eq!(msg.key.as_deref(), Some("123"));
        assert_eq!(msg.header("source"), Some("producer"));
        assert_eq!(msg.value, br#"{"id":"123"}"#.to_vec());
        assert_eq!(msg.published_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn entry_without_payload_is_rejected() {
        let err = parse_read_reply("shop-events", reply(vec![entry("1-0", &[("key", "1")])]));
        assert!(matches!(err, Err(RedisStreamsError::Deserialization(_))));
    }

    #[test]
    fn trimmed_pending_entry_is_skipped() {
        let trimmed = redis::Value::Bulk(vec![data("1-0"), redis::Value::Nil]);
        assert_eq!(parse_read_reply("shop-events", reply(vec![trimmed])).unwrap(), None);
    }
}

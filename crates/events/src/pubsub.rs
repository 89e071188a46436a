//! Publish/subscribe transport contract (mechanics only).
//!
//! This module defines the **event channel** seen by application handlers: a
//! pluggable transport that publishes typed payloads, hands out one message per
//! subscribe call, and tracks consumer progress through explicit offset commits.
//!
//! ## Delivery Model
//!
//! - **Synchronous acknowledgment**: `publish_*` returns once the transport has
//!   accepted (or rejected) the message; the channel keeps no reference to it.
//! - **At-least-once**: a message whose offset was never committed may be
//!   delivered again (after a consumer restart or rebalance).
//! - **Per-partition ordering**: messages sharing a routing key share a partition
//!   and are delivered in publish order.
//!
//! ## Subscription Lifecycle
//!
//! ```text
//! Unconfigured -> Configured -> Subscribed -> (Delivering <-> AwaitingCommit) -> Closed
//! ```
//!
//! `AwaitingCommit` only occurs with [`PubSub::subscribe_with_commit`]; plain
//! [`PubSub::subscribe`] commits on receipt and stays in `Delivering`.
//!
//! ## Thread Safety
//!
//! Implementations are `Send + Sync` and shared by many concurrent contexts.
//! `subscribe*` park the calling thread until a message arrives or the channel
//! is closed; `close()` must wake every parked caller.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use shopkit_core::{DataError, DataResult};

use crate::health::Health;
use crate::message::{Headers, Message, PublishOptions, TopicPartition};

/// Commit callback for [`PubSub::subscribe_with_commit`].
///
/// Returns `true` when the caller has processed the message and its offset
/// should be committed.
pub type CommitFn<'a> = &'a mut dyn FnMut(&Message) -> bool;

/// Observable subscription lifecycle state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// No transport configured at all.
    Unconfigured,
    /// Transport configured, nobody subscribed yet.
    Configured,
    /// A subscriber is attached and waiting.
    Subscribed,
    /// A message was handed out.
    Delivering,
    /// A commit-aware subscriber holds a message it has not acknowledged yet.
    AwaitingCommit,
    /// Channel closed; subscribe calls fail.
    Closed,
}

impl SubscriptionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubscriptionState::Unconfigured => "unconfigured",
            SubscriptionState::Configured => "configured",
            SubscriptionState::Subscribed => "subscribed",
            SubscriptionState::Delivering => "delivering",
            SubscriptionState::AwaitingCommit => "awaiting_commit",
            SubscriptionState::Closed => "closed",
        }
    }
}

/// Pluggable publish/subscribe transport.
///
/// Publishing and binding are generic over the payload type, so the payload
/// shape is checked at compile time. As a consequence the trait is used through
/// generics (`P: PubSub`) rather than trait objects.
///
/// ## Error Handling
///
/// - unknown topic / partition / routing target → `DataError::NotFound { id }`
/// - transport unusable or closed → `DataError::ConnectionFailure`
/// - malformed payload on bind → `DataError::DeserializationFailure`
///
/// `commit_offset` never fails the caller; implementations log failures.
pub trait PubSub: Send + Sync {
    /// Publish `payload` to `topic` with explicit delivery options.
    fn publish_event_with_options<P>(
        &self,
        topic: &str,
        payload: &P,
        headers: &Headers,
        options: &PublishOptions,
    ) -> DataResult<()>
    where
        P: Serialize + ?Sized;

    /// Publish with default options; same delivery semantics as
    /// `publish_event_with_options(.., &PublishOptions::default())`.
    fn publish_event<P>(&self, topic: &str, payload: &P, headers: &Headers) -> DataResult<()>
    where
        P: Serialize + ?Sized,
    {
        self.publish_event_with_options(topic, payload, headers, &PublishOptions::default())
    }

    /// Block until one message is available, commit it, and return it.
    fn subscribe(&self) -> DataResult<Message>;

    /// Block until one message is available and hand it to `commit`; the offset
    /// is committed only when `commit` returns `true`.
    fn subscribe_with_commit(&self, commit: CommitFn<'_>) -> DataResult<Message>;

    /// Decode raw payload bytes into `T`.
    fn bind<T>(&self, raw: &[u8]) -> DataResult<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(raw).map_err(|e| DataError::deserialization(e.to_string()))
    }

    /// Liveness probe against the transport.
    fn ping(&self) -> DataResult<()>;

    /// Structured status; never fails.
    fn health_check(&self) -> Health;

    /// Whether a transport is configured at all.
    fn is_set(&self) -> bool;

    /// Advance the committed position for a topic partition (fire-and-forget).
    fn commit_offset(&self, marker: TopicPartition);

    /// Current lifecycle state of the subscription.
    ///
    /// Transports that do not track delivery report `Configured`, or
    /// `Unconfigured` when no transport is set.
    fn state(&self) -> SubscriptionState {
        if self.is_set() {
            SubscriptionState::Configured
        } else {
            SubscriptionState::Unconfigured
        }
    }

    /// Close the channel, waking any parked subscriber.
    fn close(&self) {}
}

impl<S> PubSub for Arc<S>
where
    S: PubSub + ?Sized,
{
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
        (**self).publish_event_with_options(topic, payload, headers, options)
    }

    fn publish_event<P>(&self, topic: &str, payload: &P, headers: &Headers) -> DataResult<()>
    where
        P: Serialize + ?Sized,
    {
        (**self).publish_event(topic, payload, headers)
    }

    fn subscribe(&self) -> DataResult<Message> {
        (**self).subscribe()
    }

    fn subscribe_with_commit(&self, commit: CommitFn<'_>) -> DataResult<Message> {
        (**self).subscribe_with_commit(commit)
    }

    fn bind<T>(&self, raw: &[u8]) -> DataResult<T>
    where
        T: DeserializeOwned,
    {
        (**self).bind(raw)
    }

    fn ping(&self) -> DataResult<()> {
        (**self).ping()
    }

    fn health_check(&self) -> Health {
        (**self).health_check()
    }

    fn is_set(&self) -> bool {
        (**self).is_set()
    }

    fn commit_offset(&self, marker: TopicPartition) {
        (**self).commit_offset(marker)
    }

    fn state(&self) -> SubscriptionState {
        (**self).state()
    }

    fn close(&self) {
        (**self).close()
    }
}

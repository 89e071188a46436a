//! Unconfigured [`PubSub`] placeholder.

use serde::Serialize;
use tracing::warn;

use shopkit_core::{DataError, DataResult};

use crate::health::Health;
use crate::message::{Headers, Message, PublishOptions, TopicPartition};
use crate::pubsub::{CommitFn, PubSub, SubscriptionState};

const NOT_CONFIGURED: &str = "pubsub not configured";

/// Transport used when no pub/sub backend is configured.
///
/// `is_set()` is `false`, so callers can tell "unconfigured" apart from
/// "configured but unreachable". Every operation fails with
/// `ConnectionFailure`; health reports `Down`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPubSub;

impl PubSub for NullPubSub {
    fn publish_event_with_options<P>(
        &self,
        _topic: &str,
        _payload: &P,
        _headers: &Headers,
        _options: &PublishOptions,
    ) -> DataResult<()>
    where
        P: Serialize + ?Sized,
    {
        Err(DataError::connection(NOT_CONFIGURED))
    }

    fn subscribe(&self) -> DataResult<Message> {
        Err(DataError::connection(NOT_CONFIGURED))
    }

    fn subscribe_with_commit(&self, _commit: CommitFn<'_>) -> DataResult<Message> {
        Err(DataError::connection(NOT_CONFIGURED))
    }

    fn ping(&self) -> DataResult<()> {
        Err(DataError::connection(NOT_CONFIGURED))
    }

    fn health_check(&self) -> Health {
        Health::down("none").detail("reason", NOT_CONFIGURED)
    }

    fn is_set(&self) -> bool {
        false
    }

    fn commit_offset(&self, marker: TopicPartition) {
        warn!(topic = %marker.topic, "offset commit dropped: {NOT_CONFIGURED}");
    }

    fn state(&self) -> SubscriptionState {
        SubscriptionState::Unconfigured
    }
}

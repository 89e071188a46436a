//! Event channel: pub/sub contract, message types and in-process transports.

pub mod health;
pub mod in_memory_pubsub;
pub mod message;
pub mod null_pubsub;
pub mod offsets;
pub mod pubsub;

pub use health::{Health, HealthStatus};
pub use in_memory_pubsub::InMemoryPubSub;
pub use message::{Headers, Message, Offset, PublishOptions, TopicPartition};
pub use null_pubsub::NullPubSub;
pub use offsets::{InMemoryOffsetStore, OffsetStore};
pub use pubsub::{CommitFn, PubSub, SubscriptionState};

//! Background workers.

pub mod subscriber_worker;

pub use subscriber_worker::{SubscriberWorker, WorkerHandle, WorkerStats};

//! Infrastructure pub/sub transports.
//!
//! The channel contract lives in `shopkit-events` as pure mechanics (plus the
//! in-process broker). This module provides infrastructure-backed transports.

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsPubSub};

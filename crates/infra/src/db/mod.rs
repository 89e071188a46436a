//! Database session abstraction.
//!
//! The record store never talks to a driver directly: it renders a
//! [`Statement`] and hands it to a [`Session`]. Drivers live behind that trait.
//!
//! - `InMemorySession`: thread-safe tables for tests/dev.
//! - `PostgresSession` (feature `postgres`): `sqlx` pool on an owned runtime.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod session;
pub mod statement;

pub use in_memory::InMemorySession;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSession;
pub use session::{QueryResult, Session, SessionError};
pub use statement::Statement;

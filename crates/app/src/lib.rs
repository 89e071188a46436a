//! Application layer: execution context, handlers and process wiring.

pub mod bootstrap;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod shutdown;

pub use bootstrap::{App, AppConfig, Transport, build_pubsub, build_session};
pub use context::Context;
pub use errors::{HandlerError, HandlerResult};
pub use shutdown::{shutdown_signal, wait_for_shutdown};

//! Application handlers: shop CRUD and the producer/consumer pair.

pub mod messaging;
pub mod shops;

pub use messaging::{MessagingHandler, ShopNotice};
pub use shops::ShopHandler;

//! Shop domain module.
//!
//! The `Shop` entity and its sparse form, mapped onto the `shop` table. Pure
//! data + mapping (no IO, no storage).

pub mod shop;

pub use shop::{Shop, ShopFields};

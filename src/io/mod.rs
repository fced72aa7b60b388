//! Durable storage access.

mod keys;
mod store;

pub use keys::{channel_key, source_key};
pub use store::create_store;

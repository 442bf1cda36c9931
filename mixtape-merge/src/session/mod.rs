//! Session management: the store and its durable snapshot

pub mod snapshot;
pub mod store;

pub use store::SessionStore;

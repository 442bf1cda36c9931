//! HTTP API handlers for mixtape-merge
//!
//! REST for session queues, SSE for merge jobs and service events.

pub mod events;
pub mod health;
pub mod merge;
pub mod sessions;

pub use events::event_stream;
pub use health::health_routes;
pub use merge::merge_routes;
pub use sessions::session_routes;

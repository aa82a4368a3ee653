//! HTTP API handlers for bevly-sync
//!
//! A read endpoint over the repository plus a manual sync trigger.

pub mod drinks;
pub mod health;
pub mod sync;

pub use drinks::drink_routes;
pub use health::health_routes;
pub use sync::sync_routes;

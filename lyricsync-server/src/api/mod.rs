//! HTTP API handlers
//!
//! The only place request identifiers are validated and edge-cache headers
//! are set.

pub mod health;
pub mod lyrics;

pub use health::health_routes;
pub use lyrics::lyrics_routes;

//! HTTP API handlers for decksync-ingest
//!
//! POST /sync/run, POST /sync/cancel, GET /sync/last, GET /health

pub mod health;
pub mod sync;

pub use health::health_routes;
pub use sync::sync_routes;

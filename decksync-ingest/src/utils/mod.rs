//! Utility modules for decksync-ingest

pub mod keyed_lock;
pub mod retry;
pub mod text;

pub use keyed_lock::KeyedLocks;
pub use retry::{retry_on_lock, retry_transient, RetryPolicy};

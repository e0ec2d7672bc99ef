//! # decksync common library
//!
//! Shared code for the decksync crates:
//! - Error type used by storage and configuration code
//! - TOML configuration model and root folder resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};

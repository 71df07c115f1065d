//! Ledger RPC server: configuration and background tasks of the binary.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]

pub mod config;
pub mod rate_feed;

pub use config::{Config, ConfigError};
pub use rate_feed::RateFeed;

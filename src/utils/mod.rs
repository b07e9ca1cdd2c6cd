//! Configuration utilities

pub mod config;

pub use config::{ApiCredentials, BridgeConfig, ConfigError};

//! Core value types and constants for the indoor positioning bridge

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;

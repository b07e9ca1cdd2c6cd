//! Session lifecycle and emission filtering

pub mod controller;
pub mod filter;

pub use controller::{SessionController, SessionState, SessionStats};
pub use filter::FilterThresholds;

//! This crate is intended to contain code that is required to provide or
//! improve the observability of a system. That includes initialization logic
//! for metrics and logging.
pub mod config;
pub mod metrics;
pub mod panic_hook;
pub mod tracing;

pub use config::Config;

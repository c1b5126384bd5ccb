//! Scenario CLI - declarative HTTP and UI assertions for a storefront
//!
//! Scenarios are YAML documents describing one request (or a list of
//! browser steps) and the outcomes it must produce. The library loads,
//! runs and reports them; the binary wraps it in a command-line interface.

pub mod cli;
pub mod commands;
pub mod common;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use testing::{Runner, RunSummary, Scenario};

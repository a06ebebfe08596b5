//! Monitoring Module
//!
//! Host diagnostics reported at the start of a run.

mod environment;

pub use environment::{report_environment, EnvironmentReport};

//! Configuration and error types
//!
//! Harness configuration, sandbox selection, and the error taxonomy.

pub mod config;
pub mod types;

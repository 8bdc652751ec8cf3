//! Execution control
//!
//! Common hardening and the sandbox policies that produce isolated workers.

pub mod preexec;
pub mod sandbox;

//! Iteration loop.
//!
//! The supervisor forks one worker per iteration, enforces the deadline,
//! and reclaims the iteration directory. Exit statuses follow [`status`].

pub mod status;
pub mod supervisor;
pub mod types;
pub mod workload;

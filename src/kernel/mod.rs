//! Thin wrappers around Linux kernel primitives.
//!
//! Most `unsafe` code is concentrated here with explicit SAFETY comments.
//! Dependency direction: signal -> syscall -> namespace -> capabilities -> credentials -> mount

pub mod capabilities;
pub mod credentials;
pub mod mount;
pub mod namespace;
pub mod signal;
pub mod syscall;

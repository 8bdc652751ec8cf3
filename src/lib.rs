//! fuzzbox: a fork-per-iteration supervision harness for syscall workloads
//!
//! A main process creates a private work root, starts a loop process under
//! one of three sandbox policies, and relays its exit status. The loop
//! process runs the workload once per iteration in a fresh worker, enforces
//! a deadline, and reclaims whatever the worker left behind (mounts
//! included) before the next iteration starts.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::signal`]: Guarded memory access and process signal setup
//! - [`kernel::syscall`]: Syscall dispatch with pseudo-calls (devices, ptys, FUSE)
//! - [`kernel::namespace`]: Namespace flags and uid/gid mapping
//! - [`kernel::capabilities`]: Capability queries and dropping
//! - [`kernel::credentials`]: Transition to an unprivileged identity
//! - [`kernel::mount`]: Private root construction and detached unmounts
//!
//! ## Execution Control ([`exec`])
//! - [`exec::preexec`]: Common hardening (rlimits, pdeathsig, process group)
//! - [`exec::sandbox`]: The none/setuid/namespace sandbox policies
//!
//! ## Iteration Loop ([`core`])
//! - [`core::supervisor`]: Fork, deadline, kill, reap, reclaim
//! - [`core::status`]: Exit classes and child termination
//! - [`core::workload`]: The per-iteration workload interface
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::cleanup`]: Mount-aware recursive directory removal
//! - [`safety::workspace`]: Main process setup and the work root
//!
//! ## Configuration ([`config`])
//! - [`config::config`]: Harness configuration loading and validation
//! - [`config::types`]: Error taxonomy and exit classes

pub mod cli;
pub mod config;
pub mod core;
pub mod exec;
pub mod kernel;
pub mod safety;

pub use config::config::{HarnessConfig, SandboxKind};
pub use config::types::{ExitClass, HarnessError, Result};
pub use core::supervisor::Supervisor;
pub use core::workload::Workload;

//! Safety and cleanup
//!
//! The harness work root, and mount-aware reclamation of iteration
//! directories.

pub mod cleanup;
pub mod workspace;

//! Filesystem isolation and mount management
//!
//! Private root construction for the namespace sandbox, and detach-unmount
//! for the directory reclaimer.

pub mod rootfs;

pub use rootfs::{build_private_root, detach_unmount};

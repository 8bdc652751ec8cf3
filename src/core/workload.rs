//! Workload executor interface.
//!
//! The supervisor calls [`Workload::test`] exactly once per iteration, inside
//! the sandboxed worker, after changing into the iteration directory. The
//! workload is expected to route its calls through
//! [`crate::kernel::syscall::execute_syscall`], wrap untrusted memory access
//! in [`crate::kernel::signal::guard`], and end either by returning or via
//! [`crate::core::status::report_target_error`].
use crate::kernel::signal::guard;
use crate::kernel::syscall::{
    execute_syscall, SyscallRequest, DEV_CHAR, NR_OPEN_DEV, NR_PSEUDO_TEST,
};
use std::time::Duration;

pub trait Workload {
    fn test(&self);
}

impl<F: Fn()> Workload for F {
    fn test(&self) {
        self()
    }
}

/// Small workloads shipped with the binary for smoke-testing a deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinWorkload {
    /// Return immediately.
    Noop,
    /// Sleep until killed by the deadline.
    Hang,
    /// Run a fixed call sequence, including faulting arguments.
    Probe,
    /// Dereference an unmapped address without a guard.
    Fault,
}

impl std::str::FromStr for BuiltinWorkload {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noop" => Ok(Self::Noop),
            "hang" => Ok(Self::Hang),
            "probe" => Ok(Self::Probe),
            "fault" => Ok(Self::Fault),
            other => Err(format!(
                "unknown workload '{}' (expected noop, hang, probe or fault)",
                other
            )),
        }
    }
}

static LOOP_TEMPLATE: &[u8] = b"/dev/loop#\0";

fn probe() {
    let program = [
        SyscallRequest::new(NR_PSEUDO_TEST, &[]),
        SyscallRequest::new(libc::SYS_getpid as u64, &[]),
        SyscallRequest::new(NR_OPEN_DEV, &[DEV_CHAR, 1, 3]),
        SyscallRequest::new(
            NR_OPEN_DEV,
            &[LOOP_TEMPLATE.as_ptr() as u64, 0, libc::O_RDONLY as u64],
        ),
        // Template pointer into the unmapped first page.
        SyscallRequest::new(NR_OPEN_DEV, &[0x8, 0, libc::O_RDONLY as u64]),
    ];

    for (i, req) in program.iter().enumerate() {
        match guard(|| execute_syscall(req)) {
            Some(res) => log::debug!("call #{} nr={} -> {}", i, req.nr, res),
            None => log::debug!("call #{} nr={} faulted", i, req.nr),
        }
    }
}

impl Workload for BuiltinWorkload {
    fn test(&self) {
        match self {
            BuiltinWorkload::Noop => {}
            BuiltinWorkload::Hang => loop {
                std::thread::sleep(Duration::from_secs(1));
            },
            BuiltinWorkload::Probe => probe(),
            BuiltinWorkload::Fault => {
                // SAFETY: deliberately not safe; the fault handler ends the
                // process with the signal number.
                unsafe { std::ptr::read_volatile(0x10 as *const u8) };
            }
        }
    }
}

//! Sandbox policies.
//!
//! Each policy creates one child process, hardens it, and runs a body in it
//! (normally the iteration supervisor loop). The parent gets back an
//! [`IsolatedWorker`] handle. Every policy only removes privilege relative
//! to the caller.
//!
//! | policy      | extra steps after common hardening                        |
//! |-------------|------------------------------------------------------------|
//! | `None`      | none                                                       |
//! | `Setuid`    | clear groups, setresgid/setresuid to an unprivileged id    |
//! | `Namespace` | user/pid/uts/net namespaces, uid/gid map, private root, drop CAP_SYS_PTRACE |
use crate::config::config::{HarnessConfig, ResourceLimits, SandboxKind};
use crate::config::types::{HarnessError, Result};
use crate::core::status::run_child;
use crate::exec::preexec::apply_common_hardening;
use crate::kernel::capabilities::{drop_capability, CapabilityNumber};
use crate::kernel::credentials::transition_to_unprivileged;
use crate::kernel::mount::build_private_root;
use crate::kernel::namespace::{isolated_clone_flags, map_identity_to_root};
use nix::sched::clone;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, getgid, getuid, ForkResult, Pid};
use std::path::PathBuf;

const CLONE_STACK_SIZE: usize = 1 << 20;

/// Sandbox policy plus the fixed parameters it needs. Built once per
/// harness run.
#[derive(Clone, Debug)]
pub struct SandboxConfiguration {
    pub kind: SandboxKind,
    pub limits: ResourceLimits,
    pub unprivileged_uid: u32,
    pub unprivileged_gid: u32,
    pub scaffold_dir: PathBuf,
}

impl SandboxConfiguration {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            kind: config.sandbox,
            limits: config.limits.clone(),
            unprivileged_uid: config.unprivileged_uid,
            unprivileged_gid: config.unprivileged_gid,
            scaffold_dir: config.scaffold_dir.clone(),
        }
    }
}

/// How a worker process ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    Exited(i32),
    Signaled(i32),
}

impl WorkerExit {
    /// Status to propagate from a parent that only relays this worker.
    /// A signal death is reported as the raw signal number.
    pub fn exit_code(self) -> i32 {
        match self {
            WorkerExit::Exited(code) => code,
            WorkerExit::Signaled(sig) => sig,
        }
    }
}

/// Wait (blocking) for `pid` to terminate, retrying on EINTR.
pub fn wait_for_exit(pid: Pid) -> Result<WorkerExit> {
    loop {
        match waitpid(pid, Some(WaitPidFlag::__WALL)) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(WorkerExit::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(WorkerExit::Signaled(sig as i32)),
            Ok(_) => continue,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => {
                return Err(HarnessError::Logical(format!("waitpid({}) failed: {}", pid, e)))
            }
        }
    }
}

/// Handle to a sandboxed process. Owned by whoever spawned it until reaped.
#[derive(Debug)]
pub struct IsolatedWorker {
    pid: Pid,
    kind: SandboxKind,
}

impl IsolatedWorker {
    /// Host pid. The worker leads its own process group, so `-pid` names it.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn kind(&self) -> SandboxKind {
        self.kind
    }

    /// Reap the worker.
    pub fn wait(self) -> Result<WorkerExit> {
        wait_for_exit(self.pid)
    }
}

/// Create a sandboxed process per `config` and run `body` inside it.
///
/// In the child, setup failures and `body` errors end the process with the
/// error's exit class; the parent only sees the returned handle.
pub fn spawn_sandboxed<F>(config: &SandboxConfiguration, body: F) -> Result<IsolatedWorker>
where
    F: FnOnce() -> Result<()>,
{
    let pid = match config.kind {
        SandboxKind::None => fork_child(|| {
            apply_common_hardening(&config.limits)?;
            body()
        })?,
        SandboxKind::Setuid => fork_child(|| {
            apply_common_hardening(&config.limits)?;
            transition_to_unprivileged(config.unprivileged_uid, config.unprivileged_gid)?;
            body()
        })?,
        SandboxKind::Namespace => spawn_namespaced(config, body)?,
    };

    log::info!("Spawned {:?} sandbox worker pid {}", config.kind, pid);
    Ok(IsolatedWorker {
        pid,
        kind: config.kind,
    })
}

fn fork_child<F>(body: F) -> Result<Pid>
where
    F: FnOnce() -> Result<()>,
{
    // SAFETY: the child only runs `body` and then exits; it never returns
    // into the caller's frames.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(child),
        Ok(ForkResult::Child) => run_child(body),
        Err(e) => Err(HarnessError::Logical(format!("fork failed: {}", e))),
    }
}

fn spawn_namespaced<F>(config: &SandboxConfiguration, body: F) -> Result<Pid>
where
    F: FnOnce() -> Result<()>,
{
    // Must be read before entering the new user namespace.
    let real_uid = getuid().as_raw();
    let real_gid = getgid().as_raw();

    let mut body = Some(body);
    let mut stack = vec![0u8; CLONE_STACK_SIZE];
    let child_cb: Box<dyn FnMut() -> isize + '_> = Box::new(move || {
        let Some(body) = body.take() else {
            return 1;
        };
        run_child(|| {
            apply_common_hardening(&config.limits)?;
            map_identity_to_root(real_uid, real_gid)?;
            build_private_root(&config.scaffold_dir)?;
            // A process can always trace its own children; without this the
            // workload could attach to and SIGSTOP the loop process above it.
            drop_capability(CapabilityNumber::SYS_PTRACE)?;
            body()
        })
    });

    // SAFETY: the child runs on its own copy of `stack` (no CLONE_VM) and
    // exits from run_child without returning.
    unsafe { clone(child_cb, &mut stack, isolated_clone_flags(), Some(libc::SIGCHLD)) }
        .map_err(|e| HarnessError::Logical(format!("clone(namespace sandbox) failed: {}", e)))
}

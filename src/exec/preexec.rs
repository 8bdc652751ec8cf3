use crate::config::config::ResourceLimits;
use crate::config::types::{HarnessError, Result};
use crate::kernel::namespace::detach_shared_contexts;
/// Common hardening applied by every sandbox policy
///
/// The sequence is fixed:
/// 1. prctl(PR_SET_PDEATHSIG, SIGKILL)
/// 2. new process group, then new session (best-effort)
/// 3. rlimits: address space, file size, stack, core = 0
/// 4. detach from the parent's mount/IPC/IO contexts (best-effort)
use nix::sys::resource::{getrlimit, setrlimit, Resource};

/// Lower `resource` to `limit` for both soft and hard values. Never raises:
/// a limit above the current hard limit is clamped to it.
pub fn apply_rlimit(name: &str, resource: Resource, limit: u64) -> Result<()> {
    let (_, hard) = getrlimit(resource)
        .map_err(|e| HarnessError::Logical(format!("getrlimit({}) failed: {}", name, e)))?;
    let value = limit.min(hard);

    setrlimit(resource, value, value).map_err(|e| {
        HarnessError::Logical(format!("Failed to apply {}={}: {}", name, value, e))
    })?;

    log::debug!("{} set to {}", name, value);
    Ok(())
}

/// Setup parent death signal for the calling (child) process
pub fn setup_parent_death_signal() -> Result<()> {
    use nix::sys::prctl;
    use nix::sys::signal::Signal;

    prctl::set_pdeathsig(Signal::SIGKILL).map_err(|e| {
        HarnessError::Logical(format!("Failed to set parent death signal: {}", e))
    })
}

/// Become the leader of a new process group so the whole group can be
/// killed at once.
pub fn enter_new_process_group() {
    if let Err(e) = nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), nix::unistd::Pid::from_raw(0)) {
        log::debug!("setpgid failed: {}", e);
    }
}

/// Steps shared by all sandbox policies; runs in the freshly created child.
pub fn apply_common_hardening(limits: &ResourceLimits) -> Result<()> {
    setup_parent_death_signal()?;

    enter_new_process_group();
    // Fails with EPERM when we are already a group leader; the new group
    // above is what matters.
    if let Err(e) = nix::unistd::setsid() {
        log::debug!("setsid failed: {}", e);
    }

    apply_rlimit("RLIMIT_AS", Resource::RLIMIT_AS, limits.address_space_bytes)?;
    apply_rlimit("RLIMIT_FSIZE", Resource::RLIMIT_FSIZE, limits.file_size_bytes)?;
    apply_rlimit("RLIMIT_STACK", Resource::RLIMIT_STACK, limits.stack_bytes)?;
    apply_rlimit("RLIMIT_CORE", Resource::RLIMIT_CORE, 0)?;

    detach_shared_contexts();
    Ok(())
}

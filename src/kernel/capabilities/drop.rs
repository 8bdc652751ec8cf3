use super::{CapUserHeader, CapabilityNumber, LINUX_CAPABILITY_VERSION_3};
use super::query::read_capabilities;
use crate::config::types::{HarnessError, Result};

/// Remove one capability from the effective, permitted and inheritable sets
/// of the calling process. Dropping a capability never needs privilege, so
/// failure here is a harness bug.
pub fn drop_capability(cap: CapabilityNumber) -> Result<()> {
    let mut state = read_capabilities()?;
    state.remove(cap);

    let header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };

    // SAFETY: capset(2) with a valid v3 header and two data entries.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capset,
            &header as *const CapUserHeader,
            state.data.as_ptr(),
        )
    };
    if rc != 0 {
        return Err(HarnessError::Logical(format!(
            "capset dropping capability {} failed: {}",
            cap.value(),
            std::io::Error::last_os_error()
        )));
    }

    log::debug!("Dropped capability {}", cap.value());
    Ok(())
}

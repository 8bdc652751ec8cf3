use super::{
    CapUserData, CapUserHeader, CapabilityNumber, CapabilitySet, CapabilityState,
    LINUX_CAPABILITY_VERSION_3,
};
use crate::config::types::{HarnessError, Result};

/// Read the calling process's capability sets via capget(2).
pub fn read_capabilities() -> Result<CapabilityState> {
    let mut header = CapUserHeader {
        version: LINUX_CAPABILITY_VERSION_3,
        pid: 0,
    };
    let mut data = [CapUserData::default(); 2];

    // SAFETY: version 3 header with pid 0 (self) and a two-entry data array.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_capget,
            &mut header as *mut CapUserHeader,
            data.as_mut_ptr(),
        )
    };
    if rc != 0 {
        return Err(HarnessError::Logical(format!(
            "capget failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    Ok(CapabilityState { data })
}

pub fn has_capability(set: CapabilitySet, cap: CapabilityNumber) -> Result<bool> {
    Ok(read_capabilities()?.contains(set, cap))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capget_on_self_succeeds() {
        assert!(read_capabilities().is_ok());
    }

    #[test]
    fn effective_is_subset_of_permitted() {
        let state = read_capabilities().unwrap();
        for entry in state.data {
            assert_eq!(entry.effective & !entry.permitted, 0);
        }
    }
}

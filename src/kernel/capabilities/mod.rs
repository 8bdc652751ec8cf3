//! Linux capability sets of the current process.
//!
//! Raw capget(2)/capset(2); no libcap dependency.

mod drop;
mod query;

pub use drop::drop_capability;
pub use query::{has_capability, read_capabilities};

/// Capability number newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CapabilityNumber(u32);

impl CapabilityNumber {
    /// CAP_SYS_PTRACE: attach to and stop arbitrary processes.
    pub const SYS_PTRACE: CapabilityNumber = CapabilityNumber(19);

    pub fn value(self) -> u32 {
        self.0
    }

    /// Index into the two-element v3 data array, and the bit within it.
    fn slot(self) -> (usize, u32) {
        ((self.0 / 32) as usize, 1u32 << (self.0 % 32))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilitySet {
    Effective,
    Permitted,
    Inheritable,
}

pub(crate) const LINUX_CAPABILITY_VERSION_3: u32 = 0x20080522;

#[repr(C)]
pub(crate) struct CapUserHeader {
    pub version: u32,
    pub pid: i32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct CapUserData {
    pub effective: u32,
    pub permitted: u32,
    pub inheritable: u32,
}

/// Snapshot of the three per-process capability sets.
/// Version 3 uses two data entries: caps 0-31 and caps 32-63.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CapabilityState {
    pub(crate) data: [CapUserData; 2],
}

impl CapabilityState {
    pub fn contains(&self, set: CapabilitySet, cap: CapabilityNumber) -> bool {
        let (idx, bit) = cap.slot();
        let entry = &self.data[idx];
        let word = match set {
            CapabilitySet::Effective => entry.effective,
            CapabilitySet::Permitted => entry.permitted,
            CapabilitySet::Inheritable => entry.inheritable,
        };
        word & bit != 0
    }

    /// Remove `cap` from all three sets.
    pub fn remove(&mut self, cap: CapabilityNumber) {
        let (idx, bit) = cap.slot();
        let entry = &mut self.data[idx];
        entry.effective &= !bit;
        entry.permitted &= !bit;
        entry.inheritable &= !bit;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_clears_all_three_sets() {
        let mut state = CapabilityState::default();
        state.data[0] = CapUserData {
            effective: u32::MAX,
            permitted: u32::MAX,
            inheritable: u32::MAX,
        };
        state.remove(CapabilityNumber::SYS_PTRACE);

        for set in [
            CapabilitySet::Effective,
            CapabilitySet::Permitted,
            CapabilitySet::Inheritable,
        ] {
            assert!(!state.contains(set, CapabilityNumber::SYS_PTRACE));
            assert!(state.contains(set, CapabilityNumber(21)));
        }
    }

    #[test]
    fn high_capabilities_use_second_entry() {
        let mut state = CapabilityState::default();
        state.data[1].permitted = 1 << 6;
        assert!(state.contains(CapabilitySet::Permitted, CapabilityNumber(38)));
        assert!(!state.contains(CapabilitySet::Effective, CapabilityNumber(38)));
    }
}

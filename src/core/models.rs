use std::path::PathBuf;

use serde::Serialize;

/// Snapshot of one mounted removable volume, taken during a single enumeration.
///
/// An empty `mount_path` means the volume has no browsable path assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub mount_path: PathBuf,
    pub device_id: String,
    pub capacity: u64,
    pub free: u64,
    pub filesystem: String,
    pub label: String,
}

impl Volume {
    pub fn used_bytes(&self) -> u64 {
        self.capacity.saturating_sub(self.free)
    }

    pub fn has_mount_path(&self) -> bool {
        !self.mount_path.as_os_str().is_empty()
    }
}

/// Outcome counters for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub enumerated: usize,
    pub already_seen: usize,
    pub rejected: usize,
    pub archived: usize,
    pub failed: usize,
}

impl CycleReport {
    /// True when the cycle touched at least one device that was not seen before.
    pub fn had_activity(&self) -> bool {
        self.rejected + self.archived + self.failed > 0
    }
}

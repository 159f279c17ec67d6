//! Process-lifetime record of devices that have already been handled.
//!
//! Membership only grows. Nothing is persisted, so a device inserted again
//! after a restart is treated as new.

use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct SeenDevices {
    ids: HashSet<String>,
}

impl SeenDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time `device_id` is offered and records it.
    /// Every later call with the same identity returns false.
    pub fn is_new(&mut self, device_id: &str) -> bool {
        if self.ids.contains(device_id) {
            return false;
        }
        self.ids.insert(device_id.to_string())
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.ids.contains(device_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

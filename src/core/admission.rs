use std::fmt;

use crate::core::models::Volume;

pub const DEFAULT_MAX_CAPACITY: u64 = 128 * 1024 * 1024 * 1024;

/// Why a volume was not archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoMountPath,
    TooLarge { capacity: u64, ceiling: u64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMountPath => write!(f, "no mount path assigned"),
            Self::TooLarge { capacity, ceiling } => {
                write!(f, "capacity {capacity} bytes exceeds ceiling {ceiling} bytes")
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub max_capacity: u64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

impl AdmissionPolicy {
    pub fn new(max_capacity: u64) -> Self {
        Self { max_capacity }
    }

    pub fn check(&self, volume: &Volume) -> Result<(), Rejection> {
        if !volume.has_mount_path() {
            return Err(Rejection::NoMountPath);
        }
        if volume.capacity > self.max_capacity {
            return Err(Rejection::TooLarge {
                capacity: volume.capacity,
                ceiling: self.max_capacity,
            });
        }
        Ok(())
    }

    pub fn admit(&self, volume: &Volume) -> bool {
        self.check(volume).is_ok()
    }
}

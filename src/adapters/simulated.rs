use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::core::error::EnumerationError;
use crate::core::hardware::VolumeEnumerator;
use crate::core::models::Volume;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Default)]
struct SimulatedState {
    volumes: Vec<Volume>,
    pending_failures: usize,
}

/// Handle for plugging and unplugging fake volumes.
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimulatedState>>,
}

impl Simulator {
    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a volume, replacing any attached volume with the same identity.
    pub fn attach(&self, volume: Volume) {
        let mut state = self.state();
        state.volumes.retain(|v| v.device_id != volume.device_id);
        state.volumes.push(volume);
    }

    /// Attach a half-full vfat volume of `size_gb` GiB, saturating at `u64::MAX` bytes.
    pub fn add_device(&self, device_id: &str, mount_path: impl Into<PathBuf>, size_gb: u64) {
        self.add_volume(
            device_id.to_string(),
            mount_path.into(),
            size_gb.saturating_mul(GIB),
            None,
        );
    }

    fn add_volume(
        &self,
        device_id: String,
        mount_path: PathBuf,
        capacity: u64,
        label: Option<String>,
    ) {
        let label = label.unwrap_or_else(|| format!("TEST_DEVICE_{}", device_id));
        self.attach(Volume {
            mount_path,
            device_id,
            capacity,
            free: capacity / 2,
            filesystem: "vfat".to_string(),
            label,
        });
    }

    pub fn remove_device(&self, device_id: &str) {
        self.state().volumes.retain(|v| v.device_id != device_id);
    }

    /// Make the next `count` enumerations fail.
    pub fn fail_enumerations(&self, count: usize) {
        self.state().pending_failures += count;
    }
}

pub struct SimulatedAdapter {
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedAdapter {
    pub fn new() -> (Self, Simulator) {
        let state = Arc::new(Mutex::new(SimulatedState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            Simulator { state },
        )
    }
}

impl VolumeEnumerator for SimulatedAdapter {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(EnumerationError::Unavailable(
                "simulated enumeration failure".to_string(),
            ));
        }

        Ok(state.volumes.clone())
    }
}

/// A line typed into the simulator console.
#[derive(Debug, PartialEq, Eq)]
pub enum SimulatorCommand {
    Add {
        device_id: String,
        mount_path: PathBuf,
        capacity: u64,
        label: Option<String>,
    },
    Remove(String),
}

impl SimulatorCommand {
    /// `add <id> <mount_path> [size_gb] [label]` or `rm <id>`.
    ///
    /// A size whose byte count does not fit in a `u64` is rejected.
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["add", id, mount, rest @ ..] => {
                let size_gb: u64 = match rest.first() {
                    Some(size) => size.parse().ok()?,
                    None => 16,
                };
                Some(Self::Add {
                    device_id: id.to_string(),
                    mount_path: PathBuf::from(mount),
                    capacity: size_gb.checked_mul(GIB)?,
                    label: rest.get(1).map(|label| label.to_string()),
                })
            }
            ["rm", id] => Some(Self::Remove(id.to_string())),
            _ => None,
        }
    }

    pub fn apply(self, simulator: &Simulator) {
        match self {
            Self::Add {
                device_id,
                mount_path,
                capacity,
                label,
            } => simulator.add_volume(device_id, mount_path, capacity, label),
            Self::Remove(device_id) => simulator.remove_device(&device_id),
        }
    }
}

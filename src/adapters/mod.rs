use std::sync::Arc;

use crate::core::error::EnumerationError;
use crate::core::hardware::VolumeEnumerator;

#[cfg(target_os = "linux")]
mod linux;
mod simulated;

#[cfg(target_os = "linux")]
pub use linux::{LinuxAdapter, LinuxAdapterConfig, MountEntry, parse_mount_table};
pub use simulated::{SimulatedAdapter, Simulator, SimulatorCommand};

/// Pick the volume source: the host's, or a simulator fed from stdin.
pub fn get_enumerator(simulation: bool) -> Result<Arc<dyn VolumeEnumerator>, EnumerationError> {
    if simulation {
        let (adapter, simulator) = SimulatedAdapter::new();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lines().map_while(Result::ok) {
                match SimulatorCommand::parse(&line) {
                    Some(cmd) => cmd.apply(&simulator),
                    None => eprintln!(
                        "(Simulator) Use: 'add <id> <mount_path> [size_gb] [label]' or 'rm <id>'"
                    ),
                }
            }
        });

        return Ok(Arc::new(adapter));
    }

    native_enumerator()
}

#[cfg(target_os = "linux")]
fn native_enumerator() -> Result<Arc<dyn VolumeEnumerator>, EnumerationError> {
    Ok(Arc::new(LinuxAdapter::with_defaults()))
}

#[cfg(not(target_os = "linux"))]
fn native_enumerator() -> Result<Arc<dyn VolumeEnumerator>, EnumerationError> {
    Err(EnumerationError::Unavailable(
        "no native volume enumerator for this platform; use --simulation".to_string(),
    ))
}

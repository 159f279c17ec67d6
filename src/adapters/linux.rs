use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::EnumerationError;
use crate::core::hardware::VolumeEnumerator;
use crate::core::models::Volume;

const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone)]
pub struct LinuxAdapterConfig {
    /// Mount table to resolve device nodes to mount points.
    pub mounts_path: PathBuf,
}

impl Default for LinuxAdapterConfig {
    fn default() -> Self {
        Self {
            mounts_path: PathBuf::from("/proc/self/mounts"),
        }
    }
}

/// Enumerates removable block devices through udev.
///
/// A device counts as a volume when udev found a filesystem on it and it sits
/// on the USB bus or on a disk flagged removable. Only filesystems that appear
/// in the mount table are reported; an unmounted one shows up on a later poll
/// once it has been mounted.
pub struct LinuxAdapter {
    config: LinuxAdapterConfig,
}

impl LinuxAdapter {
    pub fn new(config: LinuxAdapterConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(LinuxAdapterConfig::default())
    }
}

impl VolumeEnumerator for LinuxAdapter {
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError> {
        let content = fs::read_to_string(&self.config.mounts_path).map_err(|source| {
            EnumerationError::MountTable {
                path: self.config.mounts_path.clone(),
                source,
            }
        })?;
        let mounts = parse_mount_table(&content);

        let mut enumerator = udev::Enumerator::new().map_err(EnumerationError::Udev)?;
        enumerator
            .match_subsystem("block")
            .map_err(EnumerationError::Udev)?;

        let volumes = enumerator
            .scan_devices()
            .map_err(EnumerationError::Udev)?
            .filter_map(|device| volume_from_device(&device, &mounts))
            .collect();

        Ok(volumes)
    }
}

/// What udev knows about a removable filesystem before its mount is resolved.
#[derive(Debug)]
struct DeviceFacts {
    devnode: PathBuf,
    device_id: String,
    filesystem: String,
    label: String,
    capacity: u64,
}

fn volume_from_device(device: &udev::Device, mounts: &[MountEntry]) -> Option<Volume> {
    if property(device, "ID_FS_USAGE").as_deref() != Some("filesystem") {
        return None;
    }
    if !is_removable(device) {
        return None;
    }

    let facts = DeviceFacts {
        devnode: device.devnode()?.to_path_buf(),
        device_id: device_identity(device)?,
        filesystem: property(device, "ID_FS_TYPE").unwrap_or_default(),
        label: property(device, "ID_FS_LABEL").unwrap_or_default(),
        capacity: device
            .attribute_value("size")
            .and_then(|sectors| sectors.to_str()?.trim().parse::<u64>().ok())
            .map(|sectors| sectors.saturating_mul(SECTOR_SIZE))
            .unwrap_or(0),
    };

    mounted_volume(facts, mounts)
}

/// Resolve the mount point; `None` while the filesystem is not mounted.
fn mounted_volume(facts: DeviceFacts, mounts: &[MountEntry]) -> Option<Volume> {
    let Some(entry) = find_mount_point(mounts, &facts.devnode) else {
        debug!(
            devnode = %facts.devnode.display(),
            device_id = %facts.device_id,
            "Removable filesystem not mounted yet"
        );
        return None;
    };

    debug!(
        devnode = %facts.devnode.display(),
        mount = %entry.target.display(),
        fstype = %entry.fstype,
        "Resolved mount point"
    );

    let free = match free_bytes(&entry.target) {
        Ok(free) => free,
        Err(e) => {
            debug!(mount = %entry.target.display(), error = %e, "statvfs failed");
            0
        }
    };

    let filesystem = if facts.filesystem.is_empty() {
        entry.fstype.clone()
    } else {
        facts.filesystem
    };

    Some(Volume {
        mount_path: entry.target.clone(),
        device_id: facts.device_id,
        capacity: facts.capacity,
        free: free.min(facts.capacity),
        filesystem,
        label: facts.label,
    })
}

fn property(device: &udev::Device, key: &str) -> Option<String> {
    device
        .property_value(key)
        .map(|value| value.to_string_lossy().into_owned())
        .filter(|value| !value.is_empty())
}

fn is_removable(device: &udev::Device) -> bool {
    if property(device, "ID_BUS").as_deref() == Some("usb") {
        return true;
    }

    // The removable flag lives on the whole disk, not on its partitions.
    let disk = if device.devtype() == Some(OsStr::new("partition")) {
        device
            .parent_with_subsystem_devtype("block", "disk")
            .ok()
            .flatten()
    } else {
        None
    };

    disk.as_ref()
        .unwrap_or(device)
        .attribute_value("removable")
        .is_some_and(|flag| flag == "1")
}

/// Filesystem UUID first; it survives remounts and re-plugging.
fn device_identity(device: &udev::Device) -> Option<String> {
    property(device, "ID_FS_UUID")
        .or_else(|| property(device, "ID_PART_ENTRY_UUID"))
        .or_else(|| {
            property(device, "ID_SERIAL")
                .map(|serial| format!("{}-{}", serial, device.sysname().to_string_lossy()))
        })
}

fn free_bytes(mount_path: &Path) -> nix::Result<u64> {
    let stat = nix::sys::statvfs::statvfs(mount_path)?;
    Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: PathBuf,
    pub target: PathBuf,
    pub fstype: String,
}

/// Parse `/proc/mounts`-format text.
pub fn parse_mount_table(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            Some(MountEntry {
                source: unescape_mount_field(fields.next()?),
                target: unescape_mount_field(fields.next()?),
                fstype: fields.next()?.to_string(),
            })
        })
        .collect()
}

fn find_mount_point<'a>(mounts: &'a [MountEntry], devnode: &Path) -> Option<&'a MountEntry> {
    mounts.iter().find(|entry| {
        entry.source == devnode
            || (entry.source.starts_with("/dev")
                && fs::canonicalize(&entry.source).is_ok_and(|real| real == devnode))
    })
}

/// The kernel escapes space, tab, newline and backslash as `\ooo` octal.
fn unescape_mount_field(field: &str) -> PathBuf {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
            out.push(value as u8);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    PathBuf::from(OsStr::from_bytes(&out))
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
/dev/sdb1 /media/alice/MY\\040USB vfat rw,nosuid,nodev,relatime,uid=1000 0 0
/dev/sdc1 /run/media/back\\134slash exfat rw 0 0
";

    #[test]
    fn parses_mount_entries() {
        let mounts = parse_mount_table(MOUNTS);
        assert_eq!(mounts.len(), 4);
        assert_eq!(mounts[2].source, PathBuf::from("/dev/sdb1"));
        assert_eq!(mounts[2].fstype, "vfat");
    }

    #[test]
    fn unescapes_octal_sequences() {
        let mounts = parse_mount_table(MOUNTS);
        assert_eq!(mounts[2].target, PathBuf::from("/media/alice/MY USB"));
        assert_eq!(mounts[3].target, PathBuf::from("/run/media/back\\slash"));
    }

    #[test]
    fn leaves_incomplete_escapes_alone() {
        assert_eq!(unescape_mount_field("/mnt/a\\04"), PathBuf::from("/mnt/a\\04"));
        assert_eq!(unescape_mount_field("/mnt/a\\999"), PathBuf::from("/mnt/a\\999"));
    }

    #[test]
    fn finds_mount_point_for_device_node() {
        let mounts = parse_mount_table(MOUNTS);
        assert_eq!(
            find_mount_point(&mounts, Path::new("/dev/sdb1")).map(|entry| &entry.target),
            Some(&PathBuf::from("/media/alice/MY USB"))
        );
        assert_eq!(find_mount_point(&mounts, Path::new("/dev/sdz9")), None);
    }

    fn facts(devnode: &str, filesystem: &str) -> DeviceFacts {
        DeviceFacts {
            devnode: PathBuf::from(devnode),
            device_id: "1234-ABCD".to_string(),
            filesystem: filesystem.to_string(),
            label: "MYUSB".to_string(),
            capacity: 8 * 1024 * 1024 * 1024,
        }
    }

    #[test]
    fn unmounted_filesystem_is_not_reported() {
        let mounts = parse_mount_table(MOUNTS);
        assert_eq!(mounted_volume(facts("/dev/sdz9", "vfat"), &mounts), None);
    }

    #[test]
    fn mounted_filesystem_is_reported_at_its_mount_point() {
        let mounts = parse_mount_table(MOUNTS);
        let volume = mounted_volume(facts("/dev/sdb1", "vfat"), &mounts).unwrap();

        assert_eq!(volume.mount_path, PathBuf::from("/media/alice/MY USB"));
        assert_eq!(volume.device_id, "1234-ABCD");
        assert_eq!(volume.label, "MYUSB");
        assert!(volume.free <= volume.capacity);
    }

    #[test]
    fn mount_table_fstype_fills_in_missing_filesystem() {
        let mounts = parse_mount_table(MOUNTS);
        let volume = mounted_volume(facts("/dev/sdc1", ""), &mounts).unwrap();
        assert_eq!(volume.filesystem, "exfat");
    }

    #[test]
    fn missing_mount_table_is_an_enumeration_error() {
        let adapter = LinuxAdapter::new(LinuxAdapterConfig {
            mounts_path: PathBuf::from("/nonexistent/path/that/does/not/exist"),
        });
        let err = adapter.list_volumes().unwrap_err();
        assert!(matches!(err, EnumerationError::MountTable { .. }));
    }
}

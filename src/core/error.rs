use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The host's volume query failed.
#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("failed to query block devices")]
    Udev(#[source] io::Error),
    #[error("failed to read mount table {}", path.display())]
    MountTable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("volume enumeration unavailable: {0}")]
    Unavailable(String),
    #[error("volume enumeration task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// The destination root could not be prepared.
#[derive(Debug, Error)]
#[error("failed to create destination root {}", path.display())]
pub struct DestinationSetupError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// A step of the archive walk failed. The walk stops at the first failure.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("failed to read directory {}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to inspect {}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create directory {}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {} to {}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to set permissions on {}", path.display())]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("archive cancelled before {}", path.display())]
    Cancelled { path: PathBuf },
    #[error("archive task failed")]
    Task(#[from] tokio::task::JoinError),
}

impl WalkError {
    /// Path of the entry the walk failed on.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::ReadDir { path, .. }
            | Self::Inspect { path, .. }
            | Self::CreateDir { path, .. }
            | Self::Permissions { path, .. }
            | Self::Cancelled { path } => Some(path),
            Self::Copy { from, .. } => Some(from),
            Self::Task(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the underlying I/O error looks like the device was pulled mid-walk.
    pub fn is_device_removed(&self) -> bool {
        match self {
            Self::ReadDir { source, .. }
            | Self::Inspect { source, .. }
            | Self::CreateDir { source, .. }
            | Self::Copy { source, .. }
            | Self::Permissions { source, .. } => is_device_removed_error(source),
            Self::Cancelled { .. } | Self::Task(_) => false,
        }
    }
}

/// Errors that end the poll loop.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),
    #[error(transparent)]
    DestinationSetup(#[from] DestinationSetupError),
    #[error("archiving volume {device_id} failed")]
    Walk {
        device_id: String,
        #[source]
        source: WalkError,
    },
}

/// Render an error with its full source chain on one line.
pub fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Check if an I/O error indicates the device has been removed
pub(crate) fn is_device_removed_error(error: &io::Error) -> bool {
    match error.kind() {
        ErrorKind::NotFound
        | ErrorKind::BrokenPipe
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected => true,
        ErrorKind::PermissionDenied => false,
        _ => error.raw_os_error().is_some_and(|errno| {
            matches!(
                errno,
                libc::EIO | libc::ENODEV | libc::ENXIO | libc::ENOMEDIUM | libc::EMEDIUMTYPE
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eio_counts_as_device_removed() {
        let error = io::Error::from_raw_os_error(libc::EIO);
        assert!(is_device_removed_error(&error));
    }

    #[test]
    fn enomedium_counts_as_device_removed() {
        let error = io::Error::from_raw_os_error(libc::ENOMEDIUM);
        assert!(is_device_removed_error(&error));
    }

    #[test]
    fn permission_denied_is_not_device_removed() {
        let error = io::Error::new(ErrorKind::PermissionDenied, "permission denied");
        assert!(!is_device_removed_error(&error));
    }

    #[test]
    fn walk_error_exposes_offending_path() {
        let err = WalkError::Copy {
            from: PathBuf::from("/media/usb/a.txt"),
            to: PathBuf::from("/dest/MYUSB/a.txt"),
            source: io::Error::from_raw_os_error(libc::ENODEV),
        };
        assert_eq!(err.path(), Some(Path::new("/media/usb/a.txt")));
        assert!(err.is_device_removed());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn describe_includes_io_cause() {
        let err = WalkError::CreateDir {
            path: PathBuf::from("/dest/docs"),
            source: io::Error::new(ErrorKind::AlreadyExists, "file exists"),
        };
        assert_eq!(
            describe(&err),
            "failed to create directory /dest/docs: file exists"
        );
    }
}

use crate::core::error::WalkError;
use crate::core::events::{EventSender, StatusEvent};
use crate::core::transfer_engine::{TransferEngine, TransferRequest, TransferResult};
use crate::logging::LogThrottle;
use std::ffi::OsStr;
use std::fs::{self, File, Metadata, Permissions};
use std::future::Future;
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span};

/// Buffer size for file I/O operations (128KB for optimal throughput)
const BUFFER_SIZE: usize = 128 * 1024;

/// Minimum gap between "archive progress" log lines
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(2);

/// OS metadata directories that are never archived, at any depth.
pub const RESERVED_DIRECTORIES: [&str; 2] = ["System Volume Information", "$RECYCLE.BIN"];

pub fn is_reserved_directory(name: &OsStr) -> bool {
    RESERVED_DIRECTORIES.iter().any(|reserved| name == *reserved)
}

/// Native archive walker.
///
/// Mirrors a mounted volume into its destination directory:
/// - Depth-first, directories created before anything beneath them
/// - Reserved system directories pruned with their whole subtree
/// - Existing destination files truncated and replaced
/// - Permission bits copied onto every file
/// - Stops at the first failing entry; nothing is rolled back
pub struct NativeCopyEngine {
    /// Whether to fsync each file after writing (safer but slower)
    pub sync_files: bool,
    /// Whether to carry access/modification times over to the copy
    pub preserve_timestamps: bool,
}

impl Default for NativeCopyEngine {
    fn default() -> Self {
        Self {
            sync_files: false,
            preserve_timestamps: true,
        }
    }
}

impl NativeCopyEngine {
    fn options(&self) -> CopyOptions {
        CopyOptions {
            sync_files: self.sync_files,
            preserve_timestamps: self.preserve_timestamps,
        }
    }
}

impl TransferEngine for NativeCopyEngine {
    fn transfer(
        &self,
        req: &TransferRequest,
        events: EventSender,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult, WalkError>> + Send>> {
        let req = req.clone();
        let options = self.options();

        Box::pin(async move {
            let span = info_span!(
                "archive",
                device_id = %req.device_id,
                source = %req.source.display(),
                destination = %req.destination.display()
            );

            async move {
                info!("Starting archive walk");

                let span = Span::current();
                let result = tokio::task::spawn_blocking(move || {
                    let _guard = span.enter();
                    archive_tree(
                        &req.source,
                        &req.destination,
                        &options,
                        &req.cancel,
                        &events,
                    )
                })
                .await??;

                info!(
                    files = result.files_copied,
                    directories = result.directories_created,
                    bytes = result.total_bytes,
                    pruned = result.pruned,
                    duration_ms = result.duration.as_millis() as u64,
                    "Archive walk complete"
                );

                Ok::<_, WalkError>(result)
            }
            .instrument(span)
            .await
        })
    }
}

/// Options for the copy operation
#[derive(Debug, Clone, Copy)]
pub struct CopyOptions {
    pub sync_files: bool,
    pub preserve_timestamps: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            sync_files: false,
            preserve_timestamps: true,
        }
    }
}

/// Mirror `source` into `destination`, blocking until the walk finishes or fails.
pub fn archive_tree(
    source: &Path,
    destination: &Path,
    options: &CopyOptions,
    cancel: &CancellationToken,
    events: &EventSender,
) -> Result<TransferResult, WalkError> {
    let start = Instant::now();
    let mut mirror = TreeMirror {
        options,
        cancel,
        events,
        result: TransferResult::default(),
        throttle: LogThrottle::new(PROGRESS_LOG_INTERVAL),
    };

    mirror.create_dir(source, destination)?;
    mirror.mirror_dir(source, destination)?;

    mirror.result.duration = start.elapsed();
    Ok(mirror.result)
}

struct TreeMirror<'a> {
    options: &'a CopyOptions,
    cancel: &'a CancellationToken,
    events: &'a EventSender,
    result: TransferResult,
    throttle: LogThrottle,
}

impl TreeMirror<'_> {
    fn check_cancelled(&self, path: &Path) -> Result<(), WalkError> {
        if self.cancel.is_cancelled() {
            return Err(WalkError::Cancelled {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn create_dir(&mut self, source: &Path, destination: &Path) -> Result<(), WalkError> {
        self.check_cancelled(source)?;

        fs::create_dir_all(destination).map_err(|source| WalkError::CreateDir {
            path: destination.to_path_buf(),
            source,
        })?;

        let _ = self.events.send(StatusEvent::DirectoryCreated {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
        Ok(())
    }

    fn mirror_dir(&mut self, source: &Path, destination: &Path) -> Result<(), WalkError> {
        let read_err = |source_err| WalkError::ReadDir {
            path: source.to_path_buf(),
            source: source_err,
        };

        let mut entries = fs::read_dir(source)
            .map_err(read_err)?
            .collect::<io::Result<Vec<_>>>()
            .map_err(read_err)?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let name = entry.file_name();
            let src_path = entry.path();
            let dst_path = destination.join(&name);

            self.check_cancelled(&src_path)?;

            // file_type() does not follow symlinks
            let file_type = entry.file_type().map_err(|e| WalkError::Inspect {
                path: src_path.clone(),
                source: e,
            })?;

            if file_type.is_dir() {
                if is_reserved_directory(&name) {
                    debug!(path = %src_path.display(), "Skipping reserved directory");
                    self.result.pruned += 1;
                    continue;
                }
                self.create_dir(&src_path, &dst_path)?;
                self.result.directories_created += 1;
                self.mirror_dir(&src_path, &dst_path)?;
            } else if file_type.is_file() {
                let metadata = entry.metadata().map_err(|e| WalkError::Inspect {
                    path: src_path.clone(),
                    source: e,
                })?;
                self.copy_file(&src_path, &dst_path, &metadata)?;
            } else {
                debug!(path = %src_path.display(), "Skipping symlink or special file");
                self.result.skipped += 1;
            }
        }

        Ok(())
    }

    fn copy_file(
        &mut self,
        source: &Path,
        destination: &Path,
        metadata: &Metadata,
    ) -> Result<(), WalkError> {
        let _ = self.events.send(StatusEvent::FileCopyStarted {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            size: metadata.len(),
        });

        let bytes = copy_contents(source, destination, self.options.sync_files).map_err(|e| {
            WalkError::Copy {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
                source: e,
            }
        })?;

        fs::set_permissions(destination, metadata.permissions()).map_err(|e| {
            WalkError::Permissions {
                path: destination.to_path_buf(),
                source: e,
            }
        })?;

        if self.options.preserve_timestamps {
            if let Err(e) = preserve_timestamps(metadata, destination) {
                debug!(
                    dest = %destination.display(),
                    error = %e,
                    "Failed to preserve file timestamps"
                );
            }
        }

        self.result.files_copied += 1;
        self.result.total_bytes += bytes;

        if self.throttle.should_log() {
            info!(
                files = self.result.files_copied,
                bytes = self.result.total_bytes,
                current = %source.display(),
                "Archive progress"
            );
        }

        Ok(())
    }
}

/// Copy file bytes, truncating whatever already sits at `dest`.
fn copy_contents(source: &Path, dest: &Path, sync_file: bool) -> io::Result<u64> {
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, File::open(source)?);
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, create_destination(dest)?);

    let bytes_written = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;

    if sync_file {
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    }

    Ok(bytes_written)
}

/// Open `dest` for writing, making a read-only copy from an earlier archive writable first.
fn create_destination(dest: &Path) -> io::Result<File> {
    match File::create(dest) {
        Err(e) if e.kind() == ErrorKind::PermissionDenied && dest.is_file() => {
            fs::set_permissions(dest, Permissions::from_mode(0o600))?;
            File::create(dest)
        }
        other => other,
    }
}

/// Preserve access and modification timestamps from source to destination
fn preserve_timestamps(source_metadata: &Metadata, dest: &Path) -> io::Result<()> {
    let atime = filetime::FileTime::from_last_access_time(source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(source_metadata);
    filetime::set_file_times(dest, atime, mtime)
}

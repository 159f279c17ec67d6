use crate::core::error::EnumerationError;
use crate::core::models::Volume;

pub trait VolumeEnumerator: Send + Sync {
    /// List the removable volumes currently attached to the host.
    ///
    /// Volumes without a browsable path must be reported with an empty
    /// `mount_path` rather than omitted.
    /// NOTE: Implementations may perform blocking I/O and should be called
    /// from a blocking context (e.g., via spawn_blocking).
    fn list_volumes(&self) -> Result<Vec<Volume>, EnumerationError>;
}

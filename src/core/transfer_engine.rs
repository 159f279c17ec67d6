pub mod native_copy;
pub mod simulated;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::error::WalkError;
use crate::core::events::EventSender;

pub use native_copy::{NativeCopyEngine, RESERVED_DIRECTORIES, is_reserved_directory};
pub use simulated::SimulatedEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransferEngineType {
    #[default]
    Native,
    Simulated,
}

/// One volume to mirror: `source` is the mount path, `destination` the
/// per-volume archive directory.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub device_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferResult {
    pub files_copied: u64,
    /// Directories mirrored below the destination root.
    pub directories_created: u64,
    pub total_bytes: u64,
    /// Reserved directories left out of the archive.
    pub pruned: u64,
    /// Symlinks and special files that were not copied.
    pub skipped: u64,
    pub duration: Duration,
}

pub trait TransferEngine: Send + Sync {
    fn transfer(
        &self,
        req: &TransferRequest,
        events: EventSender,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult, WalkError>> + Send>>;
}

pub fn create_engine(config: &AppConfig) -> Arc<dyn TransferEngine> {
    match config.transfer_engine {
        TransferEngineType::Native => Arc::new(NativeCopyEngine {
            sync_files: config.sync_files,
            preserve_timestamps: config.preserve_timestamps,
        }),
        TransferEngineType::Simulated => Arc::new(SimulatedEngine::default()),
    }
}

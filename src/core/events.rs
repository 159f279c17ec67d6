//! Status events published by the poll loop and the archive walker.
//!
//! Rendering is left to whoever drains the channel (see `cli::console`).

use std::path::PathBuf;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use crate::core::admission::Rejection;
use crate::core::models::{CycleReport, Volume};
use crate::core::transfer_engine::TransferResult;

pub type EventSender = mpsc::UnboundedSender<StatusEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<StatusEvent>;

#[derive(Debug, Clone)]
pub enum StatusEvent {
    DeviceDetected(Volume),
    VolumeRejected {
        volume: Volume,
        reason: Rejection,
    },
    DirectoryCreated {
        source: PathBuf,
        destination: PathBuf,
    },
    FileCopyStarted {
        source: PathBuf,
        destination: PathBuf,
        size: u64,
    },
    VolumeArchived {
        volume: Volume,
        destination: PathBuf,
        result: TransferResult,
        finished_at: DateTime<Local>,
    },
    VolumeFailed {
        volume: Volume,
        error: String,
    },
    CycleComplete(CycleReport),
}

pub mod admission;
pub mod error;
pub mod events;
pub mod hardware;
pub mod layout;
pub mod models;
pub mod orchestrator;
pub mod tracker;
pub mod transfer_engine;

pub use admission::{AdmissionPolicy, Rejection};
pub use error::{DaemonError, DestinationSetupError, EnumerationError, WalkError};
pub use events::{EventReceiver, EventSender, StatusEvent};
pub use hardware::VolumeEnumerator;
pub use layout::{DestinationLayout, LabelCollision};
pub use models::{CycleReport, Volume};
pub use orchestrator::Orchestrator;
pub use tracker::SeenDevices;
pub use transfer_engine::{TransferEngine, TransferRequest, TransferResult};

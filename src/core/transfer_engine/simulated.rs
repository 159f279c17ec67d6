use crate::core::error::WalkError;
use crate::core::events::{EventSender, StatusEvent};
use crate::core::transfer_engine::{TransferEngine, TransferRequest, TransferResult};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Engine that touches nothing on disk.
///
/// It records every request it receives, which makes it the dry-run engine
/// for the daemon and the stand-in archiver for poll loop tests. Sources
/// registered with `fail_on` produce a `WalkError` instead.
#[derive(Clone, Default)]
pub struct SimulatedEngine {
    requests: Arc<Mutex<Vec<TransferRequest>>>,
    failing_sources: Arc<Mutex<Vec<PathBuf>>>,
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make transfers from `source` fail with an I/O error.
    pub fn fail_on(&self, source: impl Into<PathBuf>) {
        self.failing_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(source.into());
    }

    pub fn requests(&self) -> Vec<TransferRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Sources transferred so far, in call order.
    pub fn sources(&self) -> Vec<PathBuf> {
        self.requests().into_iter().map(|req| req.source).collect()
    }

    fn should_fail(&self, source: &Path) -> bool {
        self.failing_sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|failing| failing == source)
    }
}

impl TransferEngine for SimulatedEngine {
    fn transfer(
        &self,
        req: &TransferRequest,
        events: EventSender,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult, WalkError>> + Send>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(req.clone());

        let req = req.clone();
        let fail = self.should_fail(&req.source);

        Box::pin(async move {
            if fail {
                return Err(WalkError::ReadDir {
                    path: req.source,
                    source: io::Error::from_raw_os_error(libc::EIO),
                });
            }

            info!(
                device_id = %req.device_id,
                source = %req.source.display(),
                destination = %req.destination.display(),
                "(Simulated) Would archive volume"
            );

            let _ = events.send(StatusEvent::DirectoryCreated {
                source: req.source,
                destination: req.destination,
            });

            Ok(TransferResult::default())
        })
    }
}

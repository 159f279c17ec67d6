use std::sync::Arc;

use chrono::Local;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::FailurePolicy;
use crate::context::AppContext;
use crate::core::admission::AdmissionPolicy;
use crate::core::error::{DaemonError, DestinationSetupError, EnumerationError, WalkError, describe};
use crate::core::events::{EventSender, StatusEvent};
use crate::core::hardware::VolumeEnumerator;
use crate::core::layout::DestinationLayout;
use crate::core::models::{CycleReport, Volume};
use crate::core::tracker::SeenDevices;
use crate::core::transfer_engine::{TransferEngine, TransferRequest};

/// The poll loop.
///
/// Each tick enumerates volumes, drops devices already seen, applies the
/// admission policy and archives what is left, one volume at a time. The
/// seen-device set lives here for the whole run.
pub struct Orchestrator {
    ctx: AppContext,
    enumerator: Arc<dyn VolumeEnumerator>,
    engine: Arc<dyn TransferEngine>,
    admission: AdmissionPolicy,
    layout: DestinationLayout,
    seen: SeenDevices,
    events: EventSender,
}

impl Orchestrator {
    pub fn new(
        ctx: AppContext,
        enumerator: Arc<dyn VolumeEnumerator>,
        engine: Arc<dyn TransferEngine>,
        events: EventSender,
    ) -> Self {
        let admission = AdmissionPolicy::new(ctx.config.max_capacity_bytes);
        let layout = DestinationLayout::new(
            ctx.config.destination_root.clone(),
            ctx.config.label_collision,
        );

        Self {
            ctx,
            enumerator,
            engine,
            admission,
            layout,
            seen: SeenDevices::new(),
            events,
        }
    }

    pub fn seen(&self) -> &SeenDevices {
        &self.seen
    }

    pub fn prepare_destination(&self) -> Result<(), DestinationSetupError> {
        let root = self.layout.root();
        std::fs::create_dir_all(root).map_err(|source| DestinationSetupError {
            path: root.to_path_buf(),
            source,
        })
    }

    /// Poll until shutdown is requested or an error the failure policy does not absorb.
    pub async fn start(&mut self) -> Result<(), DaemonError> {
        info!(
            destination = %self.layout.root().display(),
            interval_ms = self.ctx.config.poll_interval_ms,
            max_capacity = self.admission.max_capacity,
            "Volume archive daemon starting"
        );

        self.prepare_destination()?;

        let mut ticker = time::interval(self.ctx.config.poll_interval());
        // A long archive delays the next cycle rather than bunching ticks up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_cycle().await {
                Ok(_) => {}
                Err(DaemonError::Walk { source, .. }) if source.is_cancelled() => break,
                Err(e) => return Err(e),
            }
        }

        info!(devices_seen = self.seen.len(), "Poll loop stopped");
        Ok(())
    }

    /// Run one enumerate → filter → archive pass.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, DaemonError> {
        let volumes = self.enumerate().await?;
        let mut report = CycleReport {
            enumerated: volumes.len(),
            ..CycleReport::default()
        };

        for volume in volumes {
            if !self.seen.is_new(&volume.device_id) {
                report.already_seen += 1;
                continue;
            }

            if let Err(reason) = self.admission.check(&volume) {
                info!(
                    device_id = %volume.device_id,
                    label = %volume.label,
                    %reason,
                    "Volume not admitted"
                );
                report.rejected += 1;
                let _ = self
                    .events
                    .send(StatusEvent::VolumeRejected { volume, reason });
                continue;
            }

            match self.archive(&volume).await {
                Ok(()) => report.archived += 1,
                Err(source) if source.is_cancelled() => {
                    return Err(DaemonError::Walk {
                        device_id: volume.device_id,
                        source,
                    });
                }
                Err(source) => {
                    let message = describe(&source);
                    error!(
                        device_id = %volume.device_id,
                        device_removed = source.is_device_removed(),
                        error = %message,
                        "Archive failed"
                    );
                    report.failed += 1;
                    let _ = self.events.send(StatusEvent::VolumeFailed {
                        volume: volume.clone(),
                        error: message,
                    });

                    if self.ctx.config.failure_policy == FailurePolicy::Abort {
                        return Err(DaemonError::Walk {
                            device_id: volume.device_id,
                            source,
                        });
                    }
                }
            }
        }

        if report.had_activity() {
            debug!(?report, "Cycle complete");
        }
        let _ = self.events.send(StatusEvent::CycleComplete(report.clone()));
        Ok(report)
    }

    async fn enumerate(&self) -> Result<Vec<Volume>, DaemonError> {
        let enumerator = Arc::clone(&self.enumerator);
        let listed = tokio::task::spawn_blocking(move || enumerator.list_volumes())
            .await
            .map_err(EnumerationError::from)
            .and_then(|result| result);

        match listed {
            Ok(volumes) => Ok(volumes),
            Err(e) if self.ctx.config.failure_policy == FailurePolicy::Continue => {
                warn!(error = %describe(&e), "Volume enumeration failed, skipping cycle");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn archive(&self, volume: &Volume) -> Result<(), WalkError> {
        let destination = self.layout.destination_for(volume);

        info!(
            device_id = %volume.device_id,
            label = %volume.label,
            mount = %volume.mount_path.display(),
            capacity = volume.capacity,
            destination = %destination.display(),
            "New volume detected"
        );
        let _ = self.events.send(StatusEvent::DeviceDetected(volume.clone()));

        let req = TransferRequest {
            device_id: volume.device_id.clone(),
            source: volume.mount_path.clone(),
            destination: destination.clone(),
            cancel: self.ctx.shutdown.child_token(),
        };

        let result = self.engine.transfer(&req, self.events.clone()).await?;

        let _ = self.events.send(StatusEvent::VolumeArchived {
            volume: volume.clone(),
            destination,
            result,
            finished_at: Local::now(),
        });
        Ok(())
    }
}

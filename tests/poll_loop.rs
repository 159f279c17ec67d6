use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use volarchd::adapters::{SimulatedAdapter, Simulator};
use volarchd::config::{AppConfig, FailurePolicy};
use volarchd::context::AppContext;
use volarchd::core::transfer_engine::SimulatedEngine;
use volarchd::core::{
    DaemonError, EventReceiver, LabelCollision, Orchestrator, Rejection, StatusEvent, Volume,
};

const GIB: u64 = 1024 * 1024 * 1024;

struct Harness {
    orchestrator: Orchestrator,
    simulator: Simulator,
    engine: SimulatedEngine,
    events: EventReceiver,
    shutdown: tokio_util::sync::CancellationToken,
    _dest: TempDir,
}

fn harness(configure: impl FnOnce(&mut AppConfig)) -> Harness {
    let dest = tempfile::tempdir().unwrap();
    let mut config = AppConfig {
        destination_root: dest.path().join("archive"),
        poll_interval_ms: 10,
        ..AppConfig::default()
    };
    configure(&mut config);

    let ctx = AppContext::new(config);
    let shutdown = ctx.shutdown.clone();
    let (adapter, simulator) = SimulatedAdapter::new();
    let engine = SimulatedEngine::new();
    let (tx, rx) = mpsc::unbounded_channel();

    Harness {
        orchestrator: Orchestrator::new(ctx, Arc::new(adapter), Arc::new(engine.clone()), tx),
        simulator,
        engine,
        events: rx,
        shutdown,
        _dest: dest,
    }
}

fn volume(id: &str, mount: &str, capacity: u64, label: &str) -> Volume {
    Volume {
        mount_path: PathBuf::from(mount),
        device_id: id.to_string(),
        capacity,
        free: capacity / 4,
        filesystem: "exfat".to_string(),
        label: label.to_string(),
    }
}

fn drain(events: &mut EventReceiver) -> Vec<StatusEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_device_is_archived_at_most_once() {
    let mut h = harness(|_| {});
    h.simulator.add_device("dev-1", "/media/one", 16);

    let first = h.orchestrator.run_cycle().await.unwrap();
    let second = h.orchestrator.run_cycle().await.unwrap();
    let third = h.orchestrator.run_cycle().await.unwrap();

    assert_eq!(first.archived, 1);
    assert_eq!(second.archived, 0);
    assert_eq!(second.already_seen, 1);
    assert_eq!(third.already_seen, 1);
    assert_eq!(h.engine.sources(), vec![PathBuf::from("/media/one")]);
}

#[tokio::test]
async fn test_remount_under_new_path_and_label_is_still_suppressed() {
    let mut h = harness(|_| {});
    h.simulator.attach(volume("dev-1", "/media/first", GIB, "FIRST"));
    h.orchestrator.run_cycle().await.unwrap();

    h.simulator.remove_device("dev-1");
    h.orchestrator.run_cycle().await.unwrap();
    h.simulator.attach(volume("dev-1", "/media/second", GIB, "RENAMED"));
    let report = h.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.already_seen, 1);
    assert_eq!(h.engine.requests().len(), 1);
}

#[tokio::test]
async fn test_volume_without_mount_path_is_marked_seen_but_never_walked() {
    let mut h = harness(|_| {});
    h.simulator.attach(volume("dev-1", "", GIB, "NOPATH"));

    let report = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.rejected, 1);
    assert!(h.orchestrator.seen().contains("dev-1"));

    // Gaining a mount path later does not bring it back
    h.simulator.attach(volume("dev-1", "/media/late", GIB, "NOPATH"));
    let report = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.already_seen, 1);
    assert!(h.engine.requests().is_empty());

    let rejected = drain(&mut h.events).into_iter().any(|event| {
        matches!(
            event,
            StatusEvent::VolumeRejected {
                reason: Rejection::NoMountPath,
                ..
            }
        )
    });
    assert!(rejected);
}

#[tokio::test]
async fn test_capacity_ceiling_is_inclusive() {
    let mut h = harness(|_| {});
    h.simulator.attach(volume("small", "/media/small", 64 * GIB, "SMALL"));
    h.simulator.attach(volume("huge", "/media/huge", 256 * GIB, "HUGE"));
    h.simulator.attach(volume("edge", "/media/edge", 128 * GIB, "EDGE"));

    let report = h.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.archived, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(
        h.engine.sources(),
        vec![PathBuf::from("/media/small"), PathBuf::from("/media/edge")]
    );
    assert!(h.orchestrator.seen().contains("huge"));
}

#[tokio::test]
async fn test_custom_ceiling_from_config() {
    let mut h = harness(|c| c.max_capacity_bytes = 8 * GIB);
    h.simulator.attach(volume("a", "/media/a", 16 * GIB, "A"));

    let report = h.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.rejected, 1);
    assert!(h.engine.requests().is_empty());
}

#[tokio::test]
async fn test_destinations_are_derived_from_fixed_root() {
    let mut h = harness(|_| {});
    let root = h._dest.path().join("archive");
    h.simulator.attach(volume("a", "/media/a", GIB, "ALPHA"));
    h.simulator.attach(volume("b", "/media/b", GIB, "BETA"));

    h.orchestrator.run_cycle().await.unwrap();

    let destinations: Vec<PathBuf> = h
        .engine
        .requests()
        .into_iter()
        .map(|req| req.destination)
        .collect();
    assert_eq!(destinations, vec![root.join("ALPHA"), root.join("BETA")]);
}

#[tokio::test]
async fn test_suffix_layout_separates_identical_labels() {
    let mut h = harness(|c| c.label_collision = LabelCollision::SuffixDeviceId);
    let root = h._dest.path().join("archive");
    h.simulator.attach(volume("1111", "/media/a", GIB, "KINGSTON"));
    h.simulator.attach(volume("2222", "/media/b", GIB, "KINGSTON"));

    h.orchestrator.run_cycle().await.unwrap();

    let destinations: Vec<PathBuf> = h
        .engine
        .requests()
        .into_iter()
        .map(|req| req.destination)
        .collect();
    assert_eq!(
        destinations,
        vec![root.join("KINGSTON-1111"), root.join("KINGSTON-2222")]
    );
}

#[tokio::test]
async fn test_abort_policy_stops_on_first_failed_volume() {
    let mut h = harness(|_| {});
    h.engine.fail_on("/media/bad");
    h.simulator.attach(volume("bad", "/media/bad", GIB, "BAD"));
    h.simulator.attach(volume("good", "/media/good", GIB, "GOOD"));

    let err = h.orchestrator.run_cycle().await.unwrap_err();

    match err {
        DaemonError::Walk { device_id, source } => {
            assert_eq!(device_id, "bad");
            assert_eq!(source.path(), Some(Path::new("/media/bad")));
        }
        other => panic!("expected walk error, got {other:?}"),
    }
    assert_eq!(h.engine.sources(), vec![PathBuf::from("/media/bad")]);
}

#[tokio::test]
async fn test_continue_policy_skips_failed_volume() {
    let mut h = harness(|c| c.failure_policy = FailurePolicy::Continue);
    h.engine.fail_on("/media/bad");
    h.simulator.attach(volume("bad", "/media/bad", GIB, "BAD"));
    h.simulator.attach(volume("good", "/media/good", GIB, "GOOD"));

    let report = h.orchestrator.run_cycle().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.archived, 1);
    // A failed device is not retried
    let report = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.already_seen, 2);
    assert_eq!(h.engine.requests().len(), 2);

    let failed = drain(&mut h.events)
        .into_iter()
        .any(|event| matches!(event, StatusEvent::VolumeFailed { ref volume, .. } if volume.device_id == "bad"));
    assert!(failed);
}

#[tokio::test]
async fn test_enumeration_failure_is_fatal_under_abort() {
    let mut h = harness(|_| {});
    h.simulator.fail_enumerations(1);

    let err = h.orchestrator.run_cycle().await.unwrap_err();

    assert!(matches!(err, DaemonError::Enumeration(_)));
}

#[tokio::test]
async fn test_enumeration_failure_is_an_empty_cycle_under_continue() {
    let mut h = harness(|c| c.failure_policy = FailurePolicy::Continue);
    h.simulator.add_device("dev-1", "/media/one", 4);
    h.simulator.fail_enumerations(1);

    let report = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.enumerated, 0);

    let report = h.orchestrator.run_cycle().await.unwrap();
    assert_eq!(report.archived, 1);
}

#[tokio::test]
async fn test_events_follow_detection_order() {
    let mut h = harness(|_| {});
    h.simulator.add_device("dev-1", "/media/one", 4);

    h.orchestrator.run_cycle().await.unwrap();
    let events = drain(&mut h.events);

    assert!(matches!(events.first(), Some(StatusEvent::DeviceDetected(v)) if v.device_id == "dev-1"));
    assert!(
        events
            .iter()
            .any(|event| matches!(event, StatusEvent::VolumeArchived { .. }))
    );
    assert!(matches!(events.last(), Some(StatusEvent::CycleComplete(report)) if report.archived == 1));
}

#[tokio::test]
async fn test_start_polls_until_shutdown() {
    let h = harness(|_| {});
    let Harness {
        mut orchestrator,
        simulator,
        engine,
        shutdown,
        _dest: dest,
        ..
    } = h;

    simulator.add_device("dev-1", "/media/one", 4);
    let handle = tokio::spawn(async move { orchestrator.start().await });

    timeout(Duration::from_secs(5), async {
        while engine.requests().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timeout waiting for the poll loop to archive");

    shutdown.cancel();
    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("poll loop did not stop")
        .unwrap();

    assert!(result.is_ok());
    assert!(dest.path().join("archive").is_dir());
    assert_eq!(engine.requests().len(), 1);
}

#[tokio::test]
async fn test_start_fails_when_destination_cannot_be_created() {
    let blocker = tempfile::NamedTempFile::new().unwrap();
    let mut h = harness(|c| c.destination_root = blocker.path().join("archive"));

    let err = h.orchestrator.start().await.unwrap_err();

    assert!(matches!(err, DaemonError::DestinationSetup(_)));
}

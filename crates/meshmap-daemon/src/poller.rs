//! Poll cycle: fetch → parse → classify → match → publish

use chrono::Utc;
use meshmap_core::{
    parse, CycleFailure, EngineSettings, FailureKind, NetworkSnapshot, RegistryEntry,
    RegistrySource, SnapshotStore,
};
use meshmap_otbr::DiagnosticSource;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cycle events for WebSocket clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PollEvent {
    SnapshotUpdated {
        cycle: u64,
        nodes: usize,
        links: usize,
        conflicts: usize,
    },
    CycleFailed {
        cycle: u64,
        kind: FailureKind,
        message: String,
        consecutive_failures: u32,
    },
}

/// What a call to [`Poller::run_once`] did
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Published(Arc<NetworkSnapshot>),
    Failed(CycleFailure),
    /// Another cycle was already running
    Skipped,
    /// Shut down while fetching
    Cancelled,
}

pub struct Poller<S> {
    source: S,
    registry: Option<Arc<dyn RegistrySource>>,
    settings: EngineSettings,
    store: Arc<SnapshotStore>,
    period: Duration,
    gate: Mutex<()>,
    cycle: AtomicU64,
    events: broadcast::Sender<PollEvent>,
    cancel: CancellationToken,
}

impl<S: DiagnosticSource> Poller<S> {
    pub fn new(
        source: S,
        registry: Option<Arc<dyn RegistrySource>>,
        settings: EngineSettings,
        store: Arc<SnapshotStore>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            source,
            registry,
            settings,
            store,
            period,
            gate: Mutex::new(()),
            cycle: AtomicU64::new(0),
            events,
            cancel,
        }
    }

    /// Subscribe to cycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Run one cycle, unless one is already in flight
    pub async fn run_once(&self) -> CycleOutcome {
        let Ok(_guard) = self.gate.try_lock() else {
            debug!("Cycle already in flight, skipping trigger");
            return CycleOutcome::Skipped;
        };
        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(cycle, "Starting poll cycle");

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                info!(cycle, "Poll cycle cancelled");
                return CycleOutcome::Cancelled;
            }
            result = self.source.fetch() => result,
        };

        let raw = match fetched {
            Ok(raw) => raw,
            Err(e) => return self.fail(cycle, e.kind(), e.to_string()),
        };
        let parsed = match parse(&raw) {
            Ok(parsed) => parsed,
            Err(e) => return self.fail(cycle, FailureKind::MalformedData, e.to_string()),
        };

        let entries = self.registry_entries().await;
        let snapshot = NetworkSnapshot::build(parsed, &entries, &self.settings, cycle, Utc::now());
        let snapshot = self.store.publish(snapshot);

        info!(
            cycle,
            nodes = snapshot.nodes.len(),
            routers = snapshot.counts.routers,
            matched = snapshot.counts.matched,
            conflicts = snapshot.conflicts.len(),
            "Topology snapshot published"
        );
        let _ = self.events.send(PollEvent::SnapshotUpdated {
            cycle,
            nodes: snapshot.nodes.len(),
            links: snapshot.links.len(),
            conflicts: snapshot.conflicts.len(),
        });
        CycleOutcome::Published(snapshot)
    }

    /// Registry sources may touch the filesystem, so read off the runtime threads
    async fn registry_entries(&self) -> Vec<RegistryEntry> {
        let Some(registry) = self.registry.clone() else {
            return Vec::new();
        };
        match tokio::task::spawn_blocking(move || registry.entries()).await {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                warn!(error = %e, "Registry unavailable, matching against no entries");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Registry read task failed, matching against no entries");
                Vec::new()
            }
        }
    }

    fn fail(&self, cycle: u64, kind: FailureKind, message: String) -> CycleOutcome {
        let failure = CycleFailure {
            cycle,
            at: Utc::now(),
            kind,
            message,
        };
        let health = self.store.record_failure(failure.clone());
        warn!(
            cycle,
            kind = ?kind,
            failures = health.consecutive_failures,
            availability = ?health.availability,
            error = %failure.message,
            "Poll cycle failed, keeping previous snapshot"
        );
        let _ = self.events.send(PollEvent::CycleFailed {
            cycle,
            kind,
            message: failure.message.clone(),
            consecutive_failures: health.consecutive_failures,
        });
        CycleOutcome::Failed(failure)
    }

    /// Poll on a fixed period until cancelled. The first cycle runs immediately.
    pub async fn run(&self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_secs = self.period.as_secs(), "Poll scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_once().await;
                }
            }
        }
        info!("Poll scheduler stopped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use meshmap_core::registry::StaticRegistry;
    use meshmap_core::store::Availability;
    use meshmap_core::{RawDiagnostics, Thresholds};
    use meshmap_otbr::FetchError;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio::sync::Notify;

    pub(crate) fn payload() -> RawDiagnostics {
        RawDiagnostics::new(
            json!({"NetworkName": "home", "State": "leader", "LeaderData": {"LeaderRouterId": 0}}),
            json!([
                {"ExtAddress": "000000000000000A", "Rloc16": 0x0000,
                 "ChildTable": [{"ExtAddress": "000000000000000B", "LinkMargin": 200}]},
                {"ExtAddress": "000000000000000B", "Rloc16": 0x0400,
                 "ChildTable": [{"ChildId": 1, "LinkMargin": 40, "Mode": {"RxOnWhenIdle": 0}}]},
                {"ExtAddress": "000000000000000C", "Rloc16": 0x0401}
            ]),
        )
    }

    pub(crate) fn timeout() -> FetchError {
        FetchError::Timeout {
            url: "http://otbr.test/node".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Replays scripted results, then keeps failing
    pub(crate) struct Scripted(std::sync::Mutex<VecDeque<Result<RawDiagnostics, FetchError>>>);

    impl Scripted {
        pub(crate) fn new(script: Vec<Result<RawDiagnostics, FetchError>>) -> Self {
            Self(std::sync::Mutex::new(script.into()))
        }
    }

    impl DiagnosticSource for Scripted {
        async fn fetch(&self) -> Result<RawDiagnostics, FetchError> {
            let next = self.0.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(timeout()))
        }
    }

    /// Blocks inside fetch until released
    struct Held {
        started: Arc<Notify>,
        release: Arc<Notify>,
    }

    impl DiagnosticSource for Held {
        async fn fetch(&self) -> Result<RawDiagnostics, FetchError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(payload())
        }
    }

    pub(crate) fn poller<S: DiagnosticSource>(source: S) -> Poller<S> {
        let registry = StaticRegistry::new(vec![RegistryEntry::new("sensor", "Window Sensor")
            .with_connection("thread", "000000000000000C")]);
        Poller::new(
            source,
            Some(Arc::new(registry)),
            EngineSettings::default(),
            Arc::new(SnapshotStore::new(3)),
            Duration::from_secs(60),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn test_publishes_snapshot() {
        let p = poller(Scripted::new(vec![Ok(payload())]));
        let mut events = p.subscribe();

        let CycleOutcome::Published(snapshot) = p.run_once().await else {
            panic!("expected a published snapshot");
        };
        assert_eq!(snapshot.cycle, 1);
        assert_eq!(snapshot.counts.routers, 1);
        assert_eq!(snapshot.counts.matched, 1);
        assert_eq!(p.store.health().availability, Availability::Fresh);
        assert!(matches!(
            events.recv().await.unwrap(),
            PollEvent::SnapshotUpdated { cycle: 1, nodes: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_previous_snapshot() {
        let p = poller(Scripted::new(vec![Ok(payload()), Err(timeout())]));

        let CycleOutcome::Published(first) = p.run_once().await else {
            panic!("expected a published snapshot");
        };
        let CycleOutcome::Failed(failure) = p.run_once().await else {
            panic!("expected a failed cycle");
        };
        assert_eq!(failure.cycle, 2);
        assert_eq!(failure.kind, FailureKind::Transport);

        let view = p.store.view();
        let kept = view.snapshot.as_ref().unwrap();
        assert!(Arc::ptr_eq(&first, kept));
        assert_eq!(view.health.availability, Availability::Stale);
        assert_eq!(view.health.stale_since_cycle, Some(2));
    }

    #[tokio::test]
    async fn test_malformed_payload_fails_cycle() {
        let bad = RawDiagnostics::new(json!({}), json!({"not": "an array"}));
        let p = poller(Scripted::new(vec![Ok(bad)]));

        let CycleOutcome::Failed(failure) = p.run_once().await else {
            panic!("expected a failed cycle");
        };
        assert_eq!(failure.kind, FailureKind::MalformedData);
        assert_eq!(p.store.health().availability, Availability::Unavailable);
    }

    #[tokio::test]
    async fn test_degrades_after_repeated_failures() {
        let p = poller(Scripted::new(vec![Ok(payload())]));
        p.run_once().await;
        for _ in 0..3 {
            p.run_once().await;
        }
        let view = p.store.view();
        assert_eq!(view.health.availability, Availability::Degraded);
        assert_eq!(view.health.consecutive_failures, 3);
        assert_eq!(view.snapshot.as_ref().unwrap().cycle, 1);
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped() {
        let started = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let p = Arc::new(poller(Held {
            started: started.clone(),
            release: release.clone(),
        }));

        let running = tokio::spawn({
            let p = p.clone();
            async move { p.run_once().await }
        });
        started.notified().await;

        assert!(matches!(p.run_once().await, CycleOutcome::Skipped));
        release.notify_one();
        assert!(matches!(running.await.unwrap(), CycleOutcome::Published(_)));
        assert_eq!(p.cycle.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_aborts_fetch() {
        let p = poller(Held {
            started: Arc::new(Notify::new()),
            release: Arc::new(Notify::new()),
        });
        p.cancel.cancel();
        assert!(matches!(p.run_once().await, CycleOutcome::Cancelled));
        // The scheduler exits right away once cancelled
        p.run().await;
    }

    #[tokio::test]
    async fn test_matches_against_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.toml");
        std::fs::write(
            &path,
            "[[device]]\nid = \"sensor\"\nname = \"Window Sensor\"\nconnections = [[\"thread\", \"000000000000000c\"]]\n",
        )
        .unwrap();

        let mut p = poller(Scripted::new(vec![Ok(payload()), Ok(payload())]));
        p.registry = Some(Arc::new(crate::registry_file::FileRegistry::new(&path)));

        let CycleOutcome::Published(first) = p.run_once().await else {
            panic!("expected a published snapshot");
        };
        assert_eq!(first.counts.matched, 1);

        // Unreadable file: the last good entries still match
        std::fs::write(&path, "[[device]\nid = ").unwrap();
        let CycleOutcome::Published(second) = p.run_once().await else {
            panic!("expected a published snapshot");
        };
        let s = second.node(&"000000000000000C".parse().unwrap()).unwrap();
        assert_eq!(s.display_name(), "Window Sensor");
    }

    #[tokio::test]
    async fn test_settings_reach_the_snapshot() {
        let mut p = poller(Scripted::new(vec![Ok(payload())]));
        p.settings.thresholds = Thresholds::new(10, 20, 30).unwrap();
        let CycleOutcome::Published(snapshot) = p.run_once().await else {
            panic!("expected a published snapshot");
        };
        let s = snapshot.node(&"000000000000000C".parse().unwrap()).unwrap();
        assert_eq!(s.link_quality, Some(meshmap_core::LinkQuality::Excellent));
    }
}

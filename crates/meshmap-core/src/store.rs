//! Snapshot store
//!
//! A single slot holding the last good snapshot plus health. The poll cycle
//! is the only writer; readers grab the whole [`StoreView`] at once and
//! never see a half-updated pair.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::snapshot::NetworkSnapshot;

pub const DEFAULT_DEGRADED_AFTER: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// No cycle has finished yet
    Pending,
    Fresh,
    /// Last cycle failed, previous snapshot still served
    Stale,
    /// Several cycles in a row failed
    Degraded,
    /// Failing and nothing to serve
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    Transport,
    MalformedData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleFailure {
    pub cycle: u64,
    pub at: DateTime<Utc>,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreHealth {
    pub availability: Availability,
    pub consecutive_failures: u32,
    pub last_success_cycle: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
    /// First failed cycle of the current failure streak
    pub stale_since_cycle: Option<u64>,
    pub stale_since: Option<DateTime<Utc>>,
    pub last_failure: Option<CycleFailure>,
}

impl Default for StoreHealth {
    fn default() -> Self {
        Self {
            availability: Availability::Pending,
            consecutive_failures: 0,
            last_success_cycle: None,
            last_success_at: None,
            stale_since_cycle: None,
            stale_since: None,
            last_failure: None,
        }
    }
}

/// What readers get: snapshot and health, consistent with each other
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreView {
    pub snapshot: Option<Arc<NetworkSnapshot>>,
    pub health: StoreHealth,
}

pub struct SnapshotStore {
    current: ArcSwap<StoreView>,
    degraded_after: u32,
}

impl SnapshotStore {
    pub fn new(degraded_after: u32) -> Self {
        Self {
            current: ArcSwap::from_pointee(StoreView::default()),
            degraded_after: degraded_after.max(1),
        }
    }

    pub fn view(&self) -> Arc<StoreView> {
        self.current.load_full()
    }

    pub fn snapshot(&self) -> Option<Arc<NetworkSnapshot>> {
        self.current.load().snapshot.clone()
    }

    pub fn health(&self) -> StoreHealth {
        self.current.load().health.clone()
    }

    /// Replace the snapshot after a successful cycle
    pub fn publish(&self, snapshot: NetworkSnapshot) -> Arc<NetworkSnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = self.current.load();
        if previous.health.consecutive_failures > 0 {
            info!(
                cycle = snapshot.cycle,
                failures = previous.health.consecutive_failures,
                "Diagnostics recovered"
            );
        }

        let health = StoreHealth {
            availability: Availability::Fresh,
            consecutive_failures: 0,
            last_success_cycle: Some(snapshot.cycle),
            last_success_at: Some(snapshot.captured_at),
            stale_since_cycle: None,
            stale_since: None,
            last_failure: previous.health.last_failure.clone(),
        };
        self.current.store(Arc::new(StoreView {
            snapshot: Some(snapshot.clone()),
            health,
        }));
        snapshot
    }

    /// Record a failed cycle; the current snapshot, if any, is kept as is
    pub fn record_failure(&self, failure: CycleFailure) -> StoreHealth {
        let previous = self.current.load_full();
        let mut health = previous.health.clone();

        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        if health.stale_since_cycle.is_none() {
            health.stale_since_cycle = Some(failure.cycle);
            health.stale_since = Some(failure.at);
        }
        health.availability = if previous.snapshot.is_none() {
            Availability::Unavailable
        } else if health.consecutive_failures >= self.degraded_after {
            Availability::Degraded
        } else {
            Availability::Stale
        };

        if health.availability == Availability::Degraded
            && previous.health.availability != Availability::Degraded
        {
            warn!(
                failures = health.consecutive_failures,
                since_cycle = ?health.stale_since_cycle,
                "Diagnostics degraded, serving last good snapshot"
            );
        }
        health.last_failure = Some(failure);

        self.current.store(Arc::new(StoreView {
            snapshot: previous.snapshot.clone(),
            health: health.clone(),
        }));
        health
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(DEFAULT_DEGRADED_AFTER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Counts, TransportPartition};

    fn snapshot(cycle: u64) -> NetworkSnapshot {
        NetworkSnapshot {
            network_name: Some("home".to_string()),
            state: Some("leader".to_string()),
            reported_router_count: Some(1),
            ext_pan_id: None,
            partition_id: None,
            leader: "000000000000000A".parse().unwrap(),
            captured_at: Utc::now(),
            cycle,
            nodes: Vec::new(),
            links: Vec::new(),
            counts: Counts::default(),
            conflicts: Vec::new(),
            ambiguous_matches: Vec::new(),
            partition: TransportPartition::default(),
        }
    }

    fn failure(cycle: u64) -> CycleFailure {
        CycleFailure {
            cycle,
            at: Utc::now(),
            kind: FailureKind::Transport,
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn test_starts_pending() {
        let store = SnapshotStore::default();
        assert_eq!(store.health().availability, Availability::Pending);
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn test_failure_keeps_snapshot() {
        let store = SnapshotStore::default();
        let published = store.publish(snapshot(1));

        let health = store.record_failure(failure(2));
        assert_eq!(health.availability, Availability::Stale);
        assert_eq!(health.stale_since_cycle, Some(2));
        assert_eq!(health.last_success_cycle, Some(1));

        let kept = store.snapshot().unwrap();
        assert!(Arc::ptr_eq(&published, &kept));
    }

    #[test]
    fn test_degrades_then_recovers() {
        let store = SnapshotStore::new(3);
        store.publish(snapshot(1));
        store.record_failure(failure(2));
        store.record_failure(failure(3));
        let health = store.record_failure(failure(4));
        assert_eq!(health.availability, Availability::Degraded);
        assert_eq!(health.consecutive_failures, 3);
        assert_eq!(health.stale_since_cycle, Some(2));
        assert!(store.snapshot().is_some());

        store.publish(snapshot(5));
        let health = store.health();
        assert_eq!(health.availability, Availability::Fresh);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.stale_since_cycle, None);
        assert_eq!(health.last_failure.map(|f| f.cycle), Some(4));
    }

    #[test]
    fn test_unavailable_without_snapshot() {
        let store = SnapshotStore::new(2);
        assert_eq!(store.record_failure(failure(1)).availability, Availability::Unavailable);
        assert_eq!(store.record_failure(failure(2)).availability, Availability::Unavailable);
    }

    #[test]
    fn test_view_serializes() {
        let store = SnapshotStore::default();
        store.publish(snapshot(1));
        let value = serde_json::to_value(&*store.view()).unwrap();
        assert_eq!(value["health"]["availability"], "fresh");
        assert_eq!(value["snapshot"]["cycle"], 1);
    }
}

//! Network snapshot: the published result of one successful cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::address::ExtAddress;
use crate::classify::{self, RouterRule};
use crate::link_quality::Thresholds;
use crate::matcher::{self, AmbiguousMatch};
use crate::model::{Link, Node, Role, Transport};
use crate::parser::{ParseConflict, ParsedTopology};
use crate::registry::{self, RegistryEntry};

/// Engine knobs that shape a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub thresholds: Thresholds,
    /// Classification rules, first match wins
    pub rules: Vec<RouterRule>,
    pub wifi_manufacturers: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            rules: classify::default_rules(),
            wifi_manufacturers: registry::default_wifi_manufacturers(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    /// Routers, not counting the leader
    pub routers: usize,
    pub end_devices: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub unresolved_children: usize,
}

/// Registry device as listed in the transport partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    /// Mesh address for Thread devices
    pub ext_address: Option<ExtAddress>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportPartition {
    /// Identities matched onto mesh nodes
    pub thread: Vec<DeviceSummary>,
    /// Registry devices that use WiFi
    pub wifi: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub network_name: Option<String>,
    pub state: Option<String>,
    pub reported_router_count: Option<u32>,
    #[serde(default)]
    pub ext_pan_id: Option<String>,
    #[serde(default)]
    pub partition_id: Option<u32>,
    pub leader: ExtAddress,
    pub captured_at: DateTime<Utc>,
    pub cycle: u64,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub counts: Counts,
    #[serde(default)]
    pub conflicts: Vec<ParseConflict>,
    #[serde(default)]
    pub ambiguous_matches: Vec<AmbiguousMatch>,
    pub partition: TransportPartition,
}

impl NetworkSnapshot {
    /// Join a parsed topology with the registry and classify it
    pub fn build(
        parsed: ParsedTopology,
        entries: &[RegistryEntry],
        settings: &EngineSettings,
        cycle: u64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let links: Vec<Link> = parsed
            .links
            .iter()
            .map(|l| Link {
                source: l.source,
                target: l.target,
                metric: l.metric,
                quality: settings.thresholds.classify(l.metric),
                origin: l.origin,
            })
            .collect();

        let mut ambiguous_matches = Vec::new();
        let mut nodes = Vec::with_capacity(parsed.nodes.len());
        for p in &parsed.nodes {
            let outcome = matcher::match_device_detailed(&p.ext_address, entries);
            if let Some(ambiguity) = outcome.ambiguity {
                warn!(
                    address = %ambiguity.ext_address,
                    chosen = %ambiguity.chosen,
                    candidates = ?ambiguity.candidates,
                    "Several registry entries claim one address, using the first"
                );
                ambiguous_matches.push(ambiguity);
            }
            let router_class = classify::classify(p, outcome.identity.as_ref(), &settings.rules);
            let link_quality = links
                .iter()
                .find(|l| l.target == p.ext_address)
                .map(|l| l.quality);

            nodes.push(Node {
                ext_address: p.ext_address,
                rloc16: p.rloc16,
                role: p.role,
                sleepy: p.sleepy,
                link_quality,
                identity: outcome.identity,
                router_class,
                leader_cost: p.leader_cost,
                ip_addresses: p.ip_addresses.clone(),
                routes: p.routes.clone(),
                unresolved_children: p.unresolved_children.clone(),
            });
        }

        let counts = Counts {
            routers: nodes.iter().filter(|n| n.role == Role::Router).count(),
            end_devices: nodes.iter().filter(|n| n.role == Role::EndDevice).count(),
            matched: nodes.iter().filter(|n| n.identity.is_some()).count(),
            unmatched: nodes.iter().filter(|n| n.identity.is_none()).count(),
            unresolved_children: nodes.iter().map(|n| n.unresolved_children.len()).sum(),
        };

        let thread = nodes
            .iter()
            .filter_map(|n| n.identity.as_ref())
            .map(|i| DeviceSummary {
                device_id: i.device_id.clone(),
                name: i.name.clone(),
                manufacturer: i.manufacturer.clone(),
                model: i.model.clone(),
                ext_address: Some(i.ext_address),
            })
            .collect();
        let wifi = entries
            .iter()
            .filter(|e| e.transport(&settings.wifi_manufacturers) == Some(Transport::Wifi))
            .map(|e| DeviceSummary {
                device_id: e.id.clone(),
                name: e.name.clone(),
                manufacturer: e.manufacturer.clone(),
                model: e.model.clone(),
                ext_address: None,
            })
            .collect();

        Self {
            network_name: parsed.summary.network_name,
            state: parsed.summary.state,
            reported_router_count: parsed.summary.reported_router_count,
            ext_pan_id: parsed.summary.ext_pan_id,
            partition_id: parsed.summary.partition_id,
            leader: parsed.leader,
            captured_at,
            cycle,
            nodes,
            links,
            counts,
            conflicts: parsed.conflicts,
            ambiguous_matches,
            partition: TransportPartition { thread, wifi },
        }
    }

    pub fn node(&self, address: &ExtAddress) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.ext_address == address)
    }

    pub fn leader_node(&self) -> Option<&Node> {
        self.node(&self.leader)
    }

    pub fn parent_link(&self, address: &ExtAddress) -> Option<&Link> {
        self.links.iter().find(|l| &l.target == address)
    }

    /// Direct children in discovery order
    pub fn children_of<'a>(&'a self, address: &'a ExtAddress) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| {
            self.parent_link(&n.ext_address)
                .is_some_and(|l| &l.source == address)
        })
    }
}

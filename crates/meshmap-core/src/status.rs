//! Read-side projections of a snapshot for the API

use serde::Serialize;

use crate::address::ExtAddress;
use crate::link_quality::LinkQuality;
use crate::model::{Role, RouteConnection};
use crate::snapshot::NetworkSnapshot;
use crate::store::StoreHealth;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkOverview {
    pub network_name: Option<String>,
    pub state: Option<String>,
    pub reported_router_count: Option<u32>,
    pub ext_pan_id: Option<String>,
    pub partition_id: Option<u32>,
    pub leader: ExtAddress,
    /// Routers excluding the leader
    pub routers: usize,
    pub end_devices: usize,
    /// Nodes plus unresolved children
    pub total_devices: usize,
    pub thread_devices: usize,
    pub wifi_devices: usize,
    pub cycle: u64,
    pub health: StoreHealth,
}

impl NetworkOverview {
    pub fn new(snapshot: &NetworkSnapshot, health: StoreHealth) -> Self {
        Self {
            network_name: snapshot.network_name.clone(),
            state: snapshot.state.clone(),
            reported_router_count: snapshot.reported_router_count,
            ext_pan_id: snapshot.ext_pan_id.clone(),
            partition_id: snapshot.partition_id,
            leader: snapshot.leader,
            routers: snapshot.counts.routers,
            end_devices: snapshot.counts.end_devices,
            total_devices: snapshot.nodes.len() + snapshot.counts.unresolved_children,
            thread_devices: snapshot.partition.thread.len(),
            wifi_devices: snapshot.partition.wifi.len(),
            cycle: snapshot.cycle,
            health,
        }
    }
}

/// A child as listed under its parent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildStatus {
    /// `None` for children only known from a child table row
    pub ext_address: Option<ExtAddress>,
    pub rloc16: Option<u16>,
    pub name: Option<String>,
    pub manufacturer: Option<String>,
    pub sleepy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub ext_address: ExtAddress,
    pub rloc16: Option<u16>,
    pub role: Role,
    pub name: String,
    pub manufacturer: Option<String>,
    pub link_quality: Option<LinkQuality>,
    pub parent: Option<ExtAddress>,
    pub child_count: usize,
    pub leader_cost: Option<u32>,
    pub children: Vec<ChildStatus>,
    pub connections: Vec<RouteConnection>,
}

impl NodeStatus {
    pub fn new(snapshot: &NetworkSnapshot, address: &ExtAddress) -> Option<Self> {
        let node = snapshot.node(address)?;

        let mut children: Vec<ChildStatus> = snapshot
            .children_of(address)
            .map(|c| ChildStatus {
                ext_address: Some(c.ext_address),
                rloc16: c.rloc16,
                name: c.identity.as_ref().map(|i| i.name.clone()),
                manufacturer: c.manufacturer().map(str::to_string),
                sleepy: c.sleepy,
            })
            .collect();
        children.extend(node.unresolved_children.iter().map(|u| ChildStatus {
            ext_address: None,
            rloc16: u.rloc16,
            name: None,
            manufacturer: None,
            sleepy: u.sleepy,
        }));

        Some(Self {
            ext_address: node.ext_address,
            rloc16: node.rloc16,
            role: node.role,
            name: node.display_name(),
            manufacturer: node.manufacturer().map(str::to_string),
            link_quality: node.link_quality,
            parent: snapshot.parent_link(address).map(|l| l.source),
            child_count: children.len(),
            leader_cost: node.leader_cost,
            children,
            connections: node.routes.clone(),
        })
    }
}

/// Status of every node, discovery order
pub fn node_statuses(snapshot: &NetworkSnapshot) -> Vec<NodeStatus> {
    snapshot
        .nodes
        .iter()
        .filter_map(|n| NodeStatus::new(snapshot, &n.ext_address))
        .collect()
}

//! Topology parser: OTBR payloads → tree of nodes and links
//!
//! The parser never fails a whole poll because of one bad row. Entries that
//! cannot be decoded are skipped, conflicting parent claims keep the
//! first-seen edge, and loops are cut. Each repair is logged and recorded as
//! a [`ParseConflict`] on the result.
//!
//! Link metrics are carried through raw; tiers are assigned later by
//! [`crate::link_quality`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::address::ExtAddress;
use crate::link_quality::scale_thread_lq;
use crate::model::{LinkOrigin, Role, RouteConnection, UnresolvedChild};
use crate::wire::{
    self, ChildTableEntry, Connectivity, DiagEntry, NodeSummary, RawDiagnostics,
    ROUTE_COST_INFINITE,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("malformed diagnostic data: {0}")]
    Malformed(String),
}

/// A repair applied while building the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseConflict {
    /// Diagnostic entry skipped because it could not be decoded
    InvalidEntry { index: usize, reason: String },
    /// Second diagnostic entry for an address already seen
    DuplicateNode { address: ExtAddress },
    /// Child claimed by more than one parent; the first claim is kept
    DuplicateParent {
        child: ExtAddress,
        kept: ExtAddress,
        dropped: ExtAddress,
    },
    /// Node listed in its own child table
    SelfLoop { address: ExtAddress },
    /// Parent chain looped back on itself; the edge into `address` was dropped
    Cycle {
        address: ExtAddress,
        dropped_parent: ExtAddress,
    },
}

impl std::fmt::Display for ParseConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseConflict::InvalidEntry { index, reason } => {
                write!(f, "diagnostic entry {} skipped: {}", index, reason)
            }
            ParseConflict::DuplicateNode { address } => {
                write!(f, "duplicate diagnostic entry for {}", address)
            }
            ParseConflict::DuplicateParent { child, kept, dropped } => write!(
                f,
                "{} claimed by {} and {}; keeping {}",
                child, kept, dropped, kept
            ),
            ParseConflict::SelfLoop { address } => {
                write!(f, "{} lists itself as a child", address)
            }
            ParseConflict::Cycle {
                address,
                dropped_parent,
            } => write!(
                f,
                "parent loop through {}; dropped edge from {}",
                address, dropped_parent
            ),
        }
    }
}

/// Network-level facts from `/node`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub network_name: Option<String>,
    /// OTBR device state (`leader`, `router`, `child`, `disabled`, ...)
    pub state: Option<String>,
    /// Address of the border router serving the REST API
    pub border_router: Option<ExtAddress>,
    pub reported_router_count: Option<u32>,
    pub ext_pan_id: Option<String>,
    pub partition_id: Option<u32>,
    pub leader_router_id: Option<u8>,
}

impl NetworkSummary {
    fn border_router_is_leader(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("leader"))
    }
}

/// Node as parsed, before classification and matching
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNode {
    pub ext_address: ExtAddress,
    pub rloc16: Option<u16>,
    pub role: Role,
    pub sleepy: bool,
    /// `Mode.DeviceType == 1`; a REED sits in the child role but is still router capable
    pub full_thread_device: bool,
    pub leader_cost: Option<u32>,
    pub ip_addresses: Vec<String>,
    pub routes: Vec<RouteConnection>,
    pub unresolved_children: Vec<UnresolvedChild>,
}

/// Edge with its raw metric, before tiering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawLink {
    pub source: ExtAddress,
    pub target: ExtAddress,
    pub metric: Option<i64>,
    pub origin: LinkOrigin,
}

/// Parser output: a tree rooted at `leader`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopology {
    pub summary: NetworkSummary,
    /// Discovery order
    pub nodes: Vec<ParsedNode>,
    /// One link per non-leader node, in the order of their targets
    pub links: Vec<RawLink>,
    pub leader: ExtAddress,
    pub conflicts: Vec<ParseConflict>,
}

impl ParsedTopology {
    pub fn parent_of(&self, address: &ExtAddress) -> Option<ExtAddress> {
        self.links
            .iter()
            .find(|l| &l.target == address)
            .map(|l| l.source)
    }
}

/// Parse one poll's payloads into a tree
pub fn parse(raw: &RawDiagnostics) -> Result<ParsedTopology, TopologyError> {
    let summary = parse_summary(&raw.node)?;
    let entries = raw.diagnostics.as_array().ok_or_else(|| {
        TopologyError::Malformed("diagnostics payload is not an array".to_string())
    })?;

    let mut conflicts = Vec::new();
    let mut graph = Graph::default();

    for (index, value) in entries.iter().enumerate() {
        let entry = match DiagEntry::deserialize(value) {
            Ok(entry) => entry,
            Err(e) => {
                record(
                    &mut conflicts,
                    ParseConflict::InvalidEntry {
                        index,
                        reason: e.to_string(),
                    },
                );
                continue;
            }
        };
        let Some(address) = entry
            .ext_address
            .as_deref()
            .and_then(ExtAddress::parse_lenient)
        else {
            record(
                &mut conflicts,
                ParseConflict::InvalidEntry {
                    index,
                    reason: "missing or invalid ExtAddress".to_string(),
                },
            );
            continue;
        };
        if graph.index.contains_key(&address) {
            record(&mut conflicts, ParseConflict::DuplicateNode { address });
            continue;
        }
        graph.push(Working::from_entry(address, entry));
    }

    if graph.nodes.is_empty() {
        return Err(TopologyError::Malformed(
            "no usable diagnostic entries".to_string(),
        ));
    }

    graph.resolve_children(&mut conflicts);
    let leader = graph.choose_leader(&summary, &mut conflicts);
    graph.break_cycles(leader, &mut conflicts);
    graph.attach_orphans(leader);

    debug!(
        nodes = graph.nodes.len(),
        conflicts = conflicts.len(),
        leader = %graph.nodes[leader].address,
        "Parsed diagnostic payload"
    );

    Ok(graph.finish(summary, leader, conflicts))
}

fn parse_summary(value: &serde_json::Value) -> Result<NetworkSummary, TopologyError> {
    if !value.is_object() {
        return Err(TopologyError::Malformed(
            "node payload is not an object".to_string(),
        ));
    }
    let raw = NodeSummary::deserialize(value)
        .map_err(|e| TopologyError::Malformed(format!("node payload: {}", e)))?;

    Ok(NetworkSummary {
        network_name: raw.network_name,
        state: raw.state,
        border_router: raw.ext_address.as_deref().and_then(ExtAddress::parse_lenient),
        reported_router_count: raw.num_of_router,
        ext_pan_id: raw.ext_pan_id,
        partition_id: raw.leader_data.as_ref().and_then(|d| d.partition_id),
        leader_router_id: raw.leader_data.as_ref().and_then(|d| d.leader_router_id),
    })
}

fn record(conflicts: &mut Vec<ParseConflict>, conflict: ParseConflict) {
    warn!(conflict = %conflict, "Repaired diagnostic data conflict");
    conflicts.push(conflict);
}

/// Best Thread link quality a node reports having (3 = best)
fn best_link_quality(connectivity: &Connectivity) -> u8 {
    let has = |count: Option<u32>| count.unwrap_or(0) > 0;
    if has(connectivity.link_quality3) {
        3
    } else if has(connectivity.link_quality2) {
        2
    } else if has(connectivity.link_quality1) {
        1
    } else {
        0
    }
}

struct Working {
    address: ExtAddress,
    rloc16: Option<u16>,
    router: bool,
    ftd: bool,
    own_sleepy: Option<bool>,
    hinted_sleepy: Option<bool>,
    best_link_quality: Option<u8>,
    leader_cost: Option<u32>,
    ip_addresses: Vec<String>,
    routes: Vec<RouteConnection>,
    unresolved: Vec<UnresolvedChild>,
    child_rows: Vec<ChildTableEntry>,
}

impl Working {
    fn from_entry(address: ExtAddress, entry: DiagEntry) -> Self {
        let mode = entry.mode.unwrap_or_default();
        // A REED is an FTD with child bits set, so prefer the RLOC16
        let router = match entry.rloc16 {
            Some(rloc) => wire::is_router_rloc(rloc),
            None => mode.is_ftd(),
        };
        let routes = entry
            .route
            .map(|r| r.route_data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|rd| {
                let router_id = rd.route_id?;
                let cost = rd.route_cost.unwrap_or(ROUTE_COST_INFINITE);
                if cost >= ROUTE_COST_INFINITE {
                    return None;
                }
                Some(RouteConnection {
                    router_id,
                    link_quality_in: rd.link_quality_in.unwrap_or(0),
                    link_quality_out: rd.link_quality_out.unwrap_or(0),
                    cost,
                })
            })
            .collect();

        Self {
            address,
            rloc16: entry.rloc16,
            router,
            ftd: mode.is_ftd(),
            own_sleepy: mode.rx_on_when_idle.map(|v| v == 0),
            hinted_sleepy: None,
            best_link_quality: entry.connectivity.as_ref().map(best_link_quality),
            leader_cost: entry.connectivity.and_then(|c| c.leader_cost),
            ip_addresses: entry.ip6_address_list,
            routes,
            unresolved: Vec::new(),
            child_rows: entry.child_table,
        }
    }

    /// Node known only from a parent's child table row
    fn from_child_row(address: ExtAddress, rloc16: Option<u16>, row: &ChildTableEntry) -> Self {
        Self {
            address,
            rloc16,
            router: row.rloc16.is_some_and(wire::is_router_rloc),
            ftd: row.mode.is_some_and(|m| m.is_ftd()),
            own_sleepy: row.mode.and_then(|m| m.rx_on_when_idle).map(|v| v == 0),
            hinted_sleepy: None,
            best_link_quality: None,
            leader_cost: None,
            ip_addresses: Vec::new(),
            routes: Vec::new(),
            unresolved: Vec::new(),
            child_rows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    parent: usize,
    metric: Option<i64>,
    origin: LinkOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unseen,
    InPath,
    Done,
}

#[derive(Default)]
struct Graph {
    nodes: Vec<Working>,
    index: HashMap<ExtAddress, usize>,
    by_rloc: HashMap<u16, usize>,
    parent: Vec<Option<Edge>>,
}

impl Graph {
    fn push(&mut self, node: Working) -> usize {
        let idx = self.nodes.len();
        self.index.insert(node.address, idx);
        if let Some(rloc) = node.rloc16 {
            self.by_rloc.entry(rloc).or_insert(idx);
        }
        self.nodes.push(node);
        self.parent.push(None);
        idx
    }

    fn address(&self, idx: usize) -> ExtAddress {
        self.nodes[idx].address
    }

    /// Turn child table rows into parent edges, first claim wins
    fn resolve_children(&mut self, conflicts: &mut Vec<ParseConflict>) {
        // Nodes synthesized from rows are appended as we go; they carry no rows
        let mut p = 0;
        while p < self.nodes.len() {
            let rows = std::mem::take(&mut self.nodes[p].child_rows);
            let parent_rloc = self.nodes[p].rloc16;

            for row in rows {
                let metric = row
                    .link_margin
                    .or(row.link_quality_in.map(scale_thread_lq));
                let row_sleepy = row.mode.and_then(|m| m.rx_on_when_idle).map(|v| v == 0);
                let rloc = row.rloc16.or_else(|| match (parent_rloc, row.child_id) {
                    (Some(parent), Some(id)) => Some((parent & 0xFC00) | (id & 0x01FF)),
                    _ => None,
                });

                let explicit = row.ext_address.as_deref().and_then(ExtAddress::parse_lenient);
                let target = match explicit {
                    Some(address) => match self.index.get(&address) {
                        Some(&idx) => idx,
                        None => self.push(Working::from_child_row(address, rloc, &row)),
                    },
                    None => match rloc.and_then(|r| self.by_rloc.get(&r).copied()) {
                        Some(idx) => idx,
                        None => {
                            self.nodes[p].unresolved.push(UnresolvedChild {
                                child_id: row.child_id,
                                rloc16: rloc,
                                sleepy: row_sleepy.unwrap_or(false),
                                timeout: row.timeout,
                            });
                            continue;
                        }
                    },
                };

                if target == p {
                    record(
                        conflicts,
                        ParseConflict::SelfLoop {
                            address: self.address(p),
                        },
                    );
                    continue;
                }
                if let Some(existing) = self.parent[target] {
                    if existing.parent != p {
                        record(
                            conflicts,
                            ParseConflict::DuplicateParent {
                                child: self.address(target),
                                kept: self.address(existing.parent),
                                dropped: self.address(p),
                            },
                        );
                    }
                    continue;
                }

                self.parent[target] = Some(Edge {
                    parent: p,
                    metric,
                    origin: LinkOrigin::ChildTable,
                });
                if self.nodes[target].hinted_sleepy.is_none() {
                    self.nodes[target].hinted_sleepy = row_sleepy;
                }
            }
            p += 1;
        }
    }

    /// Pick the root among nodes nobody claims as a child
    fn choose_leader(
        &mut self,
        summary: &NetworkSummary,
        conflicts: &mut Vec<ParseConflict>,
    ) -> usize {
        let roots: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.parent[i].is_none())
            .collect();

        let by_router_id = summary.leader_router_id.and_then(|id| {
            roots.iter().copied().find(|&i| {
                self.nodes[i]
                    .rloc16
                    .is_some_and(|r| wire::is_router_rloc(r) && wire::router_id(r) == id)
            })
        });
        let by_state = summary
            .border_router
            .filter(|_| summary.border_router_is_leader())
            .and_then(|a| self.index.get(&a).copied())
            .filter(|i| roots.contains(i));

        if let Some(leader) = by_router_id.or(by_state).or(roots.first().copied()) {
            return leader;
        }

        // Every node has a parent, so the claims are all loops
        if let Some(edge) = self.parent[0].take() {
            record(
                conflicts,
                ParseConflict::Cycle {
                    address: self.address(0),
                    dropped_parent: self.address(edge.parent),
                },
            );
        }
        0
    }

    /// Cut every parent loop at its earliest-discovered member
    fn break_cycles(&mut self, leader: usize, conflicts: &mut Vec<ParseConflict>) {
        let mut state = vec![Visit::Unseen; self.nodes.len()];
        state[leader] = Visit::Done;

        for start in 0..self.nodes.len() {
            let mut path = Vec::new();
            let mut v = start;
            loop {
                match state[v] {
                    Visit::Done => break,
                    Visit::InPath => {
                        let from = path.iter().position(|&x| x == v).unwrap_or(0);
                        let cut = path[from..].iter().copied().min().unwrap_or(v);
                        if let Some(edge) = self.parent[cut].take() {
                            record(
                                conflicts,
                                ParseConflict::Cycle {
                                    address: self.address(cut),
                                    dropped_parent: self.address(edge.parent),
                                },
                            );
                        }
                        break;
                    }
                    Visit::Unseen => {
                        state[v] = Visit::InPath;
                        path.push(v);
                        match self.parent[v] {
                            Some(edge) => v = edge.parent,
                            None => break,
                        }
                    }
                }
            }
            for x in path {
                state[x] = Visit::Done;
            }
        }
    }

    /// Symmetric router adjacency from route data, keeping the best quality seen
    fn route_adjacency(&self) -> Vec<Vec<(usize, u8)>> {
        let mut by_router_id = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if let (true, Some(rloc)) = (node.router, node.rloc16) {
                by_router_id.entry(wire::router_id(rloc)).or_insert(i);
            }
        }

        let mut adjacency: Vec<Vec<(usize, u8)>> = vec![Vec::new(); self.nodes.len()];
        let mut add = |a: usize, b: usize, lq: u8| {
            match adjacency[a].iter_mut().find(|(x, _)| *x == b) {
                Some(existing) => existing.1 = existing.1.max(lq),
                None => adjacency[a].push((b, lq)),
            }
        };
        for (u, node) in self.nodes.iter().enumerate() {
            for route in &node.routes {
                if route.link_quality_in == 0 {
                    continue;
                }
                let Some(&v) = by_router_id.get(&route.router_id) else {
                    continue;
                };
                if v != u {
                    add(u, v, route.link_quality_in);
                    add(v, u, route.link_quality_in);
                }
            }
        }
        adjacency
    }

    fn connected(&self, leader: usize) -> Vec<bool> {
        (0..self.nodes.len())
            .map(|start| {
                let mut v = start;
                for _ in 0..=self.nodes.len() {
                    if v == leader {
                        return true;
                    }
                    match self.parent[v] {
                        Some(edge) => v = edge.parent,
                        None => return false,
                    }
                }
                false
            })
            .collect()
    }

    /// Give every parentless node a parent so the tree is whole
    fn attach_orphans(&mut self, leader: usize) {
        let adjacency = self.route_adjacency();

        // One hop further from the leader per round
        loop {
            let connected = self.connected(leader);
            let mut attached = false;
            for u in 0..self.nodes.len() {
                if !connected[u] {
                    continue;
                }
                for &(v, lq) in &adjacency[u] {
                    if v == leader || connected[v] || self.parent[v].is_some() {
                        continue;
                    }
                    self.parent[v] = Some(Edge {
                        parent: u,
                        metric: Some(scale_thread_lq(lq)),
                        origin: LinkOrigin::Route,
                    });
                    attached = true;
                }
            }
            if !attached {
                break;
            }
        }

        for v in 0..self.nodes.len() {
            if v == leader || self.parent[v].is_some() {
                continue;
            }
            debug!(
                node = %self.nodes[v].address,
                "No parent evidence, attaching to leader"
            );
            self.parent[v] = Some(Edge {
                parent: leader,
                metric: self.nodes[v].best_link_quality.map(scale_thread_lq),
                origin: LinkOrigin::Attached,
            });
        }
    }

    fn finish(
        self,
        summary: NetworkSummary,
        leader: usize,
        conflicts: Vec<ParseConflict>,
    ) -> ParsedTopology {
        let links = self
            .parent
            .iter()
            .enumerate()
            .filter_map(|(i, edge)| {
                edge.map(|e| RawLink {
                    source: self.nodes[e.parent].address,
                    target: self.nodes[i].address,
                    metric: e.metric,
                    origin: e.origin,
                })
            })
            .collect();
        let leader_address = self.nodes[leader].address;

        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(i, w)| {
                let role = if i == leader {
                    Role::Leader
                } else if w.router {
                    Role::Router
                } else {
                    Role::EndDevice
                };
                let sleepy =
                    role == Role::EndDevice && w.own_sleepy.or(w.hinted_sleepy).unwrap_or(false);
                ParsedNode {
                    ext_address: w.address,
                    rloc16: w.rloc16,
                    role,
                    sleepy,
                    full_thread_device: w.ftd || w.router,
                    leader_cost: w.leader_cost,
                    ip_addresses: w.ip_addresses,
                    routes: w.routes,
                    unresolved_children: w.unresolved,
                }
            })
            .collect();

        ParsedTopology {
            summary,
            nodes,
            links,
            leader: leader_address,
            conflicts,
        }
    }
}

//! OTBR REST payloads
//!
//! `RawDiagnostics` is what the diagnostic client hands over: the decoded but
//! otherwise untouched JSON of `/node` and `/diagnostics`. The typed structs
//! below are the subset of the OTBR schema the parser reads. Every field is
//! optional and unknown fields are ignored, so firmware that omits or adds
//! TLVs still decodes.

use serde::{Deserialize, Serialize};

/// Raw payloads of one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDiagnostics {
    /// Body of `GET /node`
    pub node: serde_json::Value,
    /// Body of `GET /diagnostics`
    pub diagnostics: serde_json::Value,
}

impl RawDiagnostics {
    pub fn new(node: serde_json::Value, diagnostics: serde_json::Value) -> Self {
        Self { node, diagnostics }
    }
}

/// `/node` summary of the border router we talk to
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeSummary {
    #[serde(default)]
    pub network_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub ext_address: Option<String>,
    #[serde(default)]
    pub num_of_router: Option<u32>,
    #[serde(default)]
    pub rloc16: Option<u16>,
    #[serde(default)]
    pub ext_pan_id: Option<String>,
    #[serde(default)]
    pub leader_data: Option<LeaderData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LeaderData {
    #[serde(default)]
    pub partition_id: Option<u32>,
    #[serde(default)]
    pub leader_router_id: Option<u8>,
}

/// One element of the `/diagnostics` array
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DiagEntry {
    #[serde(default)]
    pub ext_address: Option<String>,
    #[serde(default)]
    pub rloc16: Option<u16>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub connectivity: Option<Connectivity>,
    #[serde(default)]
    pub route: Option<Route>,
    #[serde(default)]
    pub child_table: Vec<ChildTableEntry>,
    #[serde(default, rename = "IP6AddressList")]
    pub ip6_address_list: Vec<String>,
}

/// MLE link mode flags
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Mode {
    #[serde(default)]
    pub rx_on_when_idle: Option<u8>,
    #[serde(default)]
    pub device_type: Option<u8>,
    #[serde(default)]
    pub network_data: Option<u8>,
}

impl Mode {
    /// `RxOnWhenIdle == 0` marks a sleepy device; absent means awake
    pub fn is_sleepy(&self) -> bool {
        self.rx_on_when_idle == Some(0)
    }

    /// Full Thread Device (router capable)
    pub fn is_ftd(&self) -> bool {
        self.device_type == Some(1)
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Connectivity {
    #[serde(default)]
    pub leader_cost: Option<u32>,
    #[serde(default)]
    pub link_quality3: Option<u32>,
    #[serde(default)]
    pub link_quality2: Option<u32>,
    #[serde(default)]
    pub link_quality1: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    #[serde(default)]
    pub route_data: Vec<RouteData>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteData {
    #[serde(default)]
    pub route_id: Option<u8>,
    #[serde(default)]
    pub link_quality_in: Option<u8>,
    #[serde(default)]
    pub link_quality_out: Option<u8>,
    #[serde(default)]
    pub route_cost: Option<u8>,
}

/// A row of a router's child table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChildTableEntry {
    #[serde(default)]
    pub child_id: Option<u16>,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub mode: Option<Mode>,
    #[serde(default)]
    pub ext_address: Option<String>,
    #[serde(default)]
    pub rloc16: Option<u16>,
    #[serde(default)]
    pub link_margin: Option<i64>,
    #[serde(default)]
    pub link_quality_in: Option<u8>,
}

/// Route cost reported for unreachable routers
pub const ROUTE_COST_INFINITE: u8 = 255;

/// Router id encoded in the upper six bits of an RLOC16
pub fn router_id(rloc16: u16) -> u8 {
    (rloc16 >> 10) as u8
}

/// Router RLOC16s have all child id bits clear
pub fn is_router_rloc(rloc16: u16) -> bool {
    rloc16 & 0x01FF == 0
}

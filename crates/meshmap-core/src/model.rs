//! Graph types shared by the parser, classifiers, matcher and snapshot

use serde::{Deserialize, Serialize};

use crate::address::ExtAddress;
use crate::link_quality::LinkQuality;

/// Role of a node in the reconstructed tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Leader,
    Router,
    EndDevice,
}

impl Role {
    /// Leader and routers can forward and may act as border routers
    pub fn is_router_capable(&self) -> bool {
        matches!(self, Role::Leader | Role::Router)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Leader => "Leader",
            Role::Router => "Router",
            Role::EndDevice => "End Device",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Physical medium a device identity actually uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Thread,
    Wifi,
}

/// Where a link in the tree came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkOrigin {
    /// Row of the parent's child table
    ChildTable,
    /// Router adjacency from route data
    Route,
    /// No evidence of parentage; hung off the leader to keep the tree whole
    Attached,
}

/// Parent → child edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub source: ExtAddress,
    pub target: ExtAddress,
    /// Raw link metric on the 0-255 scale, unclassified
    pub metric: Option<i64>,
    pub quality: LinkQuality,
    pub origin: LinkOrigin,
}

/// Finite-cost route advertised by a router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConnection {
    pub router_id: u8,
    pub link_quality_in: u8,
    pub link_quality_out: u8,
    pub cost: u8,
}

/// Child table row that did not correspond to any diagnostic entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedChild {
    pub child_id: Option<u16>,
    pub rloc16: Option<u16>,
    pub sleepy: bool,
    pub timeout: Option<u32>,
}

/// Vendor classification of a router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterClass {
    pub vendor: String,
    pub product: String,
    pub is_border_router: bool,
    pub is_leader: bool,
}

/// Registry identity joined onto a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedIdentity {
    /// Registry device identifier
    pub device_id: String,
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub transport: Transport,
    /// Address the join was made on
    pub ext_address: ExtAddress,
}

/// A node of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub ext_address: ExtAddress,
    pub rloc16: Option<u16>,
    pub role: Role,
    /// Only ever true for end devices
    pub sleepy: bool,
    /// Quality of the link from the parent; `None` for the leader
    pub link_quality: Option<LinkQuality>,
    pub identity: Option<MatchedIdentity>,
    pub router_class: Option<RouterClass>,
    pub leader_cost: Option<u32>,
    #[serde(default)]
    pub ip_addresses: Vec<String>,
    #[serde(default)]
    pub routes: Vec<RouteConnection>,
    #[serde(default)]
    pub unresolved_children: Vec<UnresolvedChild>,
}

impl Node {
    /// Name for display: registry name, then vendor product, then short address
    pub fn display_name(&self) -> String {
        if let Some(identity) = &self.identity {
            return identity.name.clone();
        }
        if let Some(class) = &self.router_class {
            return class.product.clone();
        }
        format!("Node {}", self.ext_address.short())
    }

    /// Manufacturer from the registry, else from vendor classification
    pub fn manufacturer(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .and_then(|i| i.manufacturer.as_deref())
            .or_else(|| self.router_class.as_ref().map(|c| c.vendor.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(role: Role) -> Node {
        Node {
            ext_address: "96308C2577D6EA17".parse().unwrap(),
            rloc16: Some(0x2000),
            role,
            sleepy: false,
            link_quality: None,
            identity: None,
            router_class: None,
            leader_cost: None,
            ip_addresses: Vec::new(),
            routes: Vec::new(),
            unresolved_children: Vec::new(),
        }
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut n = node(Role::Router);
        assert_eq!(n.display_name(), "Node EA17");
        assert_eq!(n.manufacturer(), None);

        n.router_class = Some(RouterClass {
            vendor: "Amazon/Eero".to_string(),
            product: "Eero".to_string(),
            is_border_router: true,
            is_leader: false,
        });
        assert_eq!(n.display_name(), "Eero");
        assert_eq!(n.manufacturer(), Some("Amazon/Eero"));

        n.identity = Some(MatchedIdentity {
            device_id: "dev-1".to_string(),
            name: "Hallway Eero".to_string(),
            manufacturer: Some("eero".to_string()),
            model: None,
            transport: Transport::Thread,
            ext_address: n.ext_address,
        });
        assert_eq!(n.display_name(), "Hallway Eero");
        assert_eq!(n.manufacturer(), Some("eero"));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::EndDevice).unwrap(), "\"end-device\"");
        assert!(Role::Leader.is_router_capable());
        assert!(!Role::EndDevice.is_router_capable());
    }
}

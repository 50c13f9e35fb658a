//! Border router vendor classification
//!
//! Rules are plain data: an ordered list where the first matching rule
//! names the vendor and product family. Config can put its own rules in
//! front of [`default_rules`].

use serde::{Deserialize, Serialize};

use crate::address::ExtAddress;
use crate::model::{MatchedIdentity, RouterClass};
use crate::parser::ParsedNode;

pub const UNKNOWN_VENDOR: &str = "Unknown";
pub const GENERIC_PRODUCT: &str = "Other Thread Border Router";

/// What a rule looks at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePattern {
    /// First three address bytes, e.g. `"28:6D:97"`
    Oui(String),
    /// Trailing hex digits of the address, e.g. `"EA17"`
    AddressSuffix(String),
    /// Case-insensitive fragment of the registry manufacturer
    Manufacturer(String),
    /// Case-insensitive fragment of the registry model
    Model(String),
}

/// A single rule of the classification table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterRule {
    #[serde(flatten)]
    pub pattern: RulePattern,
    pub vendor: String,
    pub product: String,
}

impl RouterRule {
    pub fn new(pattern: RulePattern, vendor: &str, product: &str) -> Self {
        Self {
            pattern,
            vendor: vendor.to_string(),
            product: product.to_string(),
        }
    }

    /// Check whether this rule applies to an address and optional registry descriptor
    pub fn matches(&self, address: &ExtAddress, descriptor: Option<&MatchedIdentity>) -> bool {
        match &self.pattern {
            RulePattern::Oui(oui) => {
                let want = hex_digits(oui);
                !want.is_empty() && address.to_string().starts_with(&want)
            }
            RulePattern::AddressSuffix(suffix) => {
                let want = hex_digits(suffix);
                !want.is_empty() && address.to_string().ends_with(&want)
            }
            RulePattern::Manufacturer(fragment) => contains_ci(
                descriptor.and_then(|d| d.manufacturer.as_deref()),
                fragment,
            ),
            RulePattern::Model(fragment) => {
                contains_ci(descriptor.and_then(|d| d.model.as_deref()), fragment)
            }
        }
    }
}

fn hex_digits(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn contains_ci(haystack: Option<&str>, fragment: &str) -> bool {
    match haystack {
        Some(h) if !fragment.is_empty() => h.to_lowercase().contains(&fragment.to_lowercase()),
        _ => false,
    }
}

/// Classify a node.
///
/// Every node is checked against the rules, first match wins. A node no rule
/// recognises still gets a generic border router class when it can route:
/// a router, the leader, or a full Thread device currently acting as a child.
/// Anything else is `None`.
pub fn classify(
    node: &ParsedNode,
    descriptor: Option<&MatchedIdentity>,
    rules: &[RouterRule],
) -> Option<RouterClass> {
    let is_leader = node.role == crate::model::Role::Leader;

    if let Some(rule) = rules
        .iter()
        .find(|r| r.matches(&node.ext_address, descriptor))
    {
        return Some(RouterClass {
            vendor: rule.vendor.clone(),
            product: rule.product.clone(),
            is_border_router: true,
            is_leader,
        });
    }

    if !node.role.is_router_capable() && !node.full_thread_device {
        return None;
    }
    Some(RouterClass {
        vendor: UNKNOWN_VENDOR.to_string(),
        product: GENERIC_PRODUCT.to_string(),
        is_border_router: true,
        is_leader,
    })
}

/// Built-in table of known border router vendors
pub fn default_rules() -> Vec<RouterRule> {
    use RulePattern::{AddressSuffix, Oui};

    let ouis: &[(&str, &str, &str)] = &[
        // Apple
        ("28:6D:97", "Apple", "Apple HomePod"),
        ("3C:22:FB", "Apple", "Apple HomePod"),
        ("38:C9:86", "Apple", "Apple TV"),
        ("D0:03:4B", "Apple", "Apple HomePod"),
        ("F0:B3:EC", "Apple", "Apple HomePod Mini"),
        ("64:B5:C6", "Apple", "Apple Device"),
        // Google / Nest
        ("18:D6:C7", "Google", "Google Nest Hub"),
        ("1C:F2:9A", "Google", "Google Nest"),
        ("20:DF:B9", "Google", "Google Nest WiFi"),
        ("48:D6:D5", "Google", "Google Nest Hub Max"),
        ("54:60:09", "Google", "Google Nest"),
        ("F4:F5:D8", "Google", "Google Nest"),
        ("F4:F5:E8", "Google", "Google Nest Mini"),
        // Amazon / Eero
        ("50:EC:50", "Amazon/Eero", "Eero Pro"),
        ("68:2A:2B", "Amazon/Eero", "Eero Pro 6"),
        ("70:3A:CB", "Amazon/Eero", "Eero"),
        ("F0:81:75", "Amazon/Eero", "Eero Pro 6E"),
        // Samsung SmartThings
        ("24:FC:E5", "Samsung", "SmartThings Hub"),
        ("28:6D:CD", "Samsung", "SmartThings Station"),
        ("D0:52:A8", "Samsung", "SmartThings Hub"),
        ("00:55:DA", "Nanoleaf", "Nanoleaf Controller"),
        // Silicon vendors, mostly dev boards
        ("04:CD:15", "Silicon Labs", "Silicon Labs Device"),
        ("58:8E:81", "Silicon Labs", "Silicon Labs Device"),
        ("84:2E:14", "Silicon Labs", "Silicon Labs Device"),
        ("F8:F0:05", "Nordic Semiconductor", "Nordic Device"),
        ("34:85:18", "Espressif", "ESP32 Thread"),
        ("40:22:D8", "Espressif", "ESP32 Thread"),
    ];

    let mut rules: Vec<RouterRule> = ouis
        .iter()
        .map(|(oui, vendor, product)| RouterRule::new(Oui(oui.to_string()), vendor, product))
        .collect();
    rules.push(RouterRule::new(
        AddressSuffix("EA17".to_string()),
        "Amazon/Eero",
        "Eero",
    ));
    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Role, Transport};

    fn parsed(address: &str, role: Role) -> ParsedNode {
        ParsedNode {
            ext_address: address.parse().unwrap(),
            rloc16: None,
            role,
            sleepy: false,
            full_thread_device: role.is_router_capable(),
            leader_cost: None,
            ip_addresses: Vec::new(),
            routes: Vec::new(),
            unresolved_children: Vec::new(),
        }
    }

    fn identity(manufacturer: &str, model: &str) -> MatchedIdentity {
        MatchedIdentity {
            device_id: "dev".to_string(),
            name: "Living Room".to_string(),
            manufacturer: Some(manufacturer.to_string()),
            model: Some(model.to_string()),
            transport: Transport::Thread,
            ext_address: "0000000000000001".parse().unwrap(),
        }
    }

    #[test]
    fn test_oui_and_suffix_rules() {
        let rules = default_rules();

        let homepod = classify(&parsed("286D97AABBCCDDEE", Role::Router), None, &rules).unwrap();
        assert_eq!(homepod.vendor, "Apple");
        assert_eq!(homepod.product, "Apple HomePod");
        assert!(homepod.is_border_router);
        assert!(!homepod.is_leader);

        let eero = classify(&parsed("96308C2577D6EA17", Role::Router), None, &rules).unwrap();
        assert_eq!(eero.vendor, "Amazon/Eero");
    }

    #[test]
    fn test_unknown_router_gets_generic_class() {
        let class = classify(&parsed("1EA5312CFB153F0B", Role::Leader), None, &default_rules()).unwrap();
        assert_eq!(class.vendor, UNKNOWN_VENDOR);
        assert_eq!(class.product, GENERIC_PRODUCT);
        assert!(class.is_border_router);
        assert!(class.is_leader);
    }

    #[test]
    fn test_minimal_end_devices_need_a_rule() {
        let node = parsed("0011223344556677", Role::EndDevice);
        assert_eq!(classify(&node, None, &default_rules()), None);
    }

    #[test]
    fn test_reed_keeps_vendor_and_fallback() {
        // Full Thread device attached as a child
        let mut homepod = parsed("286D97AABBCCDDEE", Role::EndDevice);
        homepod.full_thread_device = true;
        let class = classify(&homepod, None, &default_rules()).unwrap();
        assert_eq!(class.vendor, "Apple");
        assert!(!class.is_leader);

        let mut unknown = parsed("0011223344556677", Role::EndDevice);
        unknown.full_thread_device = true;
        let class = classify(&unknown, None, &default_rules()).unwrap();
        assert_eq!(class.product, GENERIC_PRODUCT);
    }

    #[test]
    fn test_descriptor_rules_and_order() {
        let mut rules = vec![RouterRule::new(
            RulePattern::Model("homepod".to_string()),
            "Apple",
            "HomePod (registry)",
        )];
        rules.extend(default_rules());

        let node = parsed("286D97AABBCCDDEE", Role::Router);
        let class = classify(&node, Some(&identity("Apple Inc.", "HomePod mini")), &rules).unwrap();
        assert_eq!(class.product, "HomePod (registry)");

        // Without a descriptor the OUI rule further down applies
        let class = classify(&node, None, &rules).unwrap();
        assert_eq!(class.product, "Apple HomePod");
    }

    #[test]
    fn test_rule_from_toml() {
        #[derive(Deserialize)]
        struct Table {
            router_rule: Vec<RouterRule>,
        }
        let table: Table = toml::from_str(
            r#"
            [[router_rule]]
            oui = "aa:bb:cc"
            vendor = "Acme"
            product = "Acme Hub"

            [[router_rule]]
            manufacturer = "nabu casa"
            vendor = "Nabu Casa"
            product = "SkyConnect"
            "#,
        )
        .unwrap();

        assert_eq!(table.router_rule.len(), 2);
        let node = parsed("AABBCC0000000001", Role::Router);
        assert_eq!(
            classify(&node, None, &table.router_rule).unwrap().vendor,
            "Acme"
        );
        let node = parsed("1EA5312CFB153F0B", Role::Router);
        let class = classify(&node, Some(&identity("Nabu Casa", "ZBT-1")), &table.router_rule);
        assert_eq!(class.unwrap().product, "SkyConnect");
    }
}

//! Registry join: mesh node → known device
//!
//! Pure function of the address and an explicit slice of entries, so the
//! same input always yields the same identity.

use serde::{Deserialize, Serialize};

use crate::address::ExtAddress;
use crate::model::{MatchedIdentity, Transport};
use crate::registry::RegistryEntry;

/// More than one registry entry claimed the same address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousMatch {
    pub ext_address: ExtAddress,
    /// Device id that won (first in registry order)
    pub chosen: String,
    /// All claiming device ids, registry order
    pub candidates: Vec<String>,
}

/// Result of matching one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub identity: Option<MatchedIdentity>,
    pub ambiguity: Option<AmbiguousMatch>,
}

fn claims(entry: &RegistryEntry, address: &ExtAddress) -> bool {
    // WiFi devices never join the mesh graph, whatever address they carry
    if entry.transport_marker() == Some(Transport::Wifi) {
        return false;
    }
    entry.ext_addresses().any(|a| &a == address)
}

/// Find the registry identity of a mesh node
pub fn match_device(address: &ExtAddress, entries: &[RegistryEntry]) -> Option<MatchedIdentity> {
    match_device_detailed(address, entries).identity
}

/// Like [`match_device`], also reporting when several entries claimed the address
pub fn match_device_detailed(address: &ExtAddress, entries: &[RegistryEntry]) -> MatchOutcome {
    let candidates: Vec<&RegistryEntry> = entries.iter().filter(|e| claims(e, address)).collect();

    let Some(first) = candidates.first() else {
        return MatchOutcome {
            identity: None,
            ambiguity: None,
        };
    };

    let identity = MatchedIdentity {
        device_id: first.id.clone(),
        name: first.name.clone(),
        manufacturer: first.manufacturer.clone(),
        model: first.model.clone(),
        transport: Transport::Thread,
        ext_address: *address,
    };
    let ambiguity = (candidates.len() > 1).then(|| AmbiguousMatch {
        ext_address: *address,
        chosen: first.id.clone(),
        candidates: candidates.iter().map(|e| e.id.clone()).collect(),
    });

    MatchOutcome {
        identity: Some(identity),
        ambiguity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(s: &str) -> ExtAddress {
        s.parse().unwrap()
    }

    fn registry() -> Vec<RegistryEntry> {
        vec![
            RegistryEntry::new("motion", "Hallway Motion")
                .with_manufacturer("Eve")
                .with_model("Eve Motion")
                .with_connection("thread", "a4b3c2d1e0f09876"),
            RegistryEntry::new("bulb", "Desk Bulb")
                .with_connection("ext_address", "0011223344556677"),
            RegistryEntry::new("plug", "WiFi Plug")
                .with_connection("thread", "8899AABBCCDDEEFF")
                .with_connection("transport", "wifi"),
        ]
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let entries = registry();
        let m = match_device(&addr("A4B3C2D1E0F09876"), &entries).unwrap();
        assert_eq!(m.device_id, "motion");
        assert_eq!(m.name, "Hallway Motion");
        assert_eq!(m.manufacturer.as_deref(), Some("Eve"));
        assert_eq!(m.transport, Transport::Thread);
        assert_eq!(m.ext_address, addr("a4b3c2d1e0f09876"));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(match_device(&addr("FFFFFFFFFFFFFFFF"), &registry()), None);
        assert_eq!(match_device(&addr("FFFFFFFFFFFFFFFF"), &[]), None);
    }

    #[test]
    fn test_wifi_entries_never_match() {
        assert_eq!(match_device(&addr("8899AABBCCDDEEFF"), &registry()), None);
    }

    #[test]
    fn test_ambiguous_match_is_first_in_order() {
        let mut entries = registry();
        entries.push(
            RegistryEntry::new("motion-dup", "Old Motion").with_connection("thread", "A4:B3:C2:D1:E0:F0:98:76"),
        );

        let outcome = match_device_detailed(&addr("A4B3C2D1E0F09876"), &entries);
        assert_eq!(outcome.identity.unwrap().device_id, "motion");
        let ambiguity = outcome.ambiguity.unwrap();
        assert_eq!(ambiguity.chosen, "motion");
        assert_eq!(ambiguity.candidates, vec!["motion", "motion-dup"]);

        entries.swap(0, 3);
        let outcome = match_device_detailed(&addr("A4B3C2D1E0F09876"), &entries);
        assert_eq!(outcome.identity.unwrap().device_id, "motion-dup");
    }

    proptest! {
        #[test]
        fn matching_is_idempotent(bytes in any::<[u8; 8]>(), lower in any::<bool>(), dup in any::<bool>()) {
            let address = ExtAddress::from_bytes(bytes);
            let text = if lower { address.to_string().to_lowercase() } else { address.to_string() };
            let mut entries = registry();
            entries.push(RegistryEntry::new("x", "X").with_connection("thread", &text));
            if dup {
                entries.push(RegistryEntry::new("y", "Y").with_connection("thread", &text));
            }

            let first = match_device_detailed(&address, &entries);
            let second = match_device_detailed(&address, &entries);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.identity.is_some());
        }
    }
}

//! Device registry model
//!
//! The registry is an external, read-only list of known devices. Each entry
//! carries `(kind, value)` connection identifiers; only a few kinds mean
//! anything here:
//!
//! - `thread`, `ext_address`, `extended_address`: value is an extended address
//! - `transport`: value is `thread` or `wifi`
//!
//! Registry documents are TOML (`[[device]]` tables) or JSON (an array, or an
//! object with a `device` array).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::address::ExtAddress;
use crate::model::Transport;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse registry TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Failed to parse registry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

const ADDRESS_KINDS: &[&str] = &["thread", "ext_address", "extended_address"];
const TRANSPORT_KIND: &str = "transport";

/// Manufacturers whose Matter devices sit behind a WiFi bridge
pub fn default_wifi_manufacturers() -> Vec<String> {
    vec!["nuki".to_string(), "wemo".to_string(), "lifx".to_string()]
}

/// A known device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// `(kind, value)` pairs
    #[serde(default)]
    pub connections: Vec<(String, String)>,
}

impl RegistryEntry {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            manufacturer: None,
            model: None,
            connections: Vec::new(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = Some(manufacturer.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_connection(mut self, kind: &str, value: &str) -> Self {
        self.connections.push((kind.to_string(), value.to_string()));
        self
    }

    /// Extended addresses this entry claims; unparsable values are ignored
    pub fn ext_addresses(&self) -> impl Iterator<Item = ExtAddress> + '_ {
        self.connections
            .iter()
            .filter(|(kind, _)| ADDRESS_KINDS.iter().any(|k| kind.eq_ignore_ascii_case(k)))
            .filter_map(|(_, value)| ExtAddress::parse_lenient(value))
    }

    /// Explicit `transport` marker, if any
    pub fn transport_marker(&self) -> Option<Transport> {
        self.connections
            .iter()
            .filter(|(kind, _)| kind.eq_ignore_ascii_case(TRANSPORT_KIND))
            .find_map(|(_, value)| match value.trim().to_ascii_lowercase().as_str() {
                "thread" => Some(Transport::Thread),
                "wifi" | "wi-fi" => Some(Transport::Wifi),
                _ => None,
            })
    }

    /// Resolved transport.
    ///
    /// An explicit marker wins, then a claimed extended address means Thread,
    /// then the WiFi heuristics. `None` when nothing says either way.
    pub fn transport(&self, wifi_manufacturers: &[String]) -> Option<Transport> {
        if let Some(marker) = self.transport_marker() {
            return Some(marker);
        }
        if self.ext_addresses().next().is_some() {
            return Some(Transport::Thread);
        }
        if self.looks_like_wifi(wifi_manufacturers) {
            return Some(Transport::Wifi);
        }
        None
    }

    fn looks_like_wifi(&self, wifi_manufacturers: &[String]) -> bool {
        let mentions_wifi = |s: &Option<String>| {
            s.as_deref()
                .is_some_and(|s| s.to_lowercase().contains("wifi"))
        };
        if mentions_wifi(&self.model) || self.name.to_lowercase().contains("wifi") {
            return true;
        }
        self.manufacturer.as_deref().is_some_and(|m| {
            let m = m.trim();
            wifi_manufacturers.iter().any(|w| w.eq_ignore_ascii_case(m))
        })
    }
}

/// Something that can list registry entries
pub trait RegistrySource: Send + Sync {
    fn entries(&self) -> Result<Vec<RegistryEntry>, RegistryError>;
}

/// Fixed in-memory registry
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: Vec<RegistryEntry>,
}

impl StaticRegistry {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        Self { entries }
    }
}

impl RegistrySource for StaticRegistry {
    fn entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        Ok(self.entries.clone())
    }
}

#[derive(Deserialize)]
struct TomlDocument {
    #[serde(default)]
    device: Vec<RegistryEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    List(Vec<RegistryEntry>),
    Table {
        #[serde(default)]
        device: Vec<RegistryEntry>,
    },
}

/// Parse a TOML registry document
pub fn from_toml_str(content: &str) -> Result<Vec<RegistryEntry>, RegistryError> {
    let doc: TomlDocument = toml::from_str(content)?;
    Ok(doc.device)
}

/// Parse a JSON registry document
pub fn from_json_str(content: &str) -> Result<Vec<RegistryEntry>, RegistryError> {
    let doc: JsonDocument = serde_json::from_str(content)?;
    Ok(match doc {
        JsonDocument::List(entries) => entries,
        JsonDocument::Table { device } => device,
    })
}

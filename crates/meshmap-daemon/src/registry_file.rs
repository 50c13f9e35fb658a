//! Registry source backed by a TOML or JSON file

use meshmap_core::registry::{self, RegistryEntry, RegistryError, RegistrySource};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Reads the device list from disk on every call.
///
/// When the file cannot be read or parsed the last good list is served
/// instead, so an editor mid-save does not wipe every identity.
pub struct FileRegistry {
    path: PathBuf,
    last_good: Mutex<Option<Vec<RegistryEntry>>>,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_good: Mutex::new(None),
        }
    }

    fn read(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let content = std::fs::read_to_string(&self.path).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })?;
        let is_json = self
            .path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            registry::from_json_str(&content)
        } else {
            registry::from_toml_str(&content)
        }
    }
}

impl RegistrySource for FileRegistry {
    fn entries(&self) -> Result<Vec<RegistryEntry>, RegistryError> {
        let mut last_good = self
            .last_good
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match self.read() {
            Ok(entries) => {
                debug!(path = %self.path.display(), count = entries.len(), "Loaded registry");
                *last_good = Some(entries.clone());
                Ok(entries)
            }
            Err(e) => match last_good.as_ref() {
                Some(entries) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        count = entries.len(),
                        "Registry unreadable, reusing last good entries"
                    );
                    Ok(entries.clone())
                }
                None => Err(e),
            },
        }
    }
}

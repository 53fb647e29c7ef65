//! The plugin manifest: which executable polls which plugin key.
//!
//! The on-disk form is a JSON object keyed by plugin key:
//!
//! ```json
//! {
//!   "mail_helper": {
//!     "appId": "mailer",
//!     "exec": "/usr/lib/account-polld/plugins/mail",
//!     "needsAuthenticationData": true,
//!     "profile": "unconfined"
//!   }
//! }
//! ```
//!
//! The manifest is loaded once per poll cycle and never mutated afterwards,
//! so it is shared between invocations behind an `Arc` without locking.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{PolldError, Result};

/// Profile name that launches a plugin without confinement.
pub const UNCONFINED_PROFILE: &str = "unconfined";

// ---------------------------------------------------------------------------
// PluginManifestEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifestEntry {
    /// Filled from the manifest key on load.
    #[serde(skip)]
    pub plugin_id: String,
    /// Default target application for the plugin's notifications.
    pub app_id: String,
    pub exec: PathBuf,
    /// Static arguments. Never used for credentials.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub needs_authentication_data: bool,
}

fn default_profile() -> String {
    UNCONFINED_PROFILE.to_string()
}

impl PluginManifestEntry {
    pub fn is_unconfined(&self) -> bool {
        self.profile == UNCONFINED_PROFILE
    }
}

// ---------------------------------------------------------------------------
// PluginManifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PluginManifest {
    entries: BTreeMap<String, PluginManifestEntry>,
}

impl PluginManifest {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the manifest at `path`, degrading to an empty manifest when the
    /// file is absent or unreadable. A cycle with an empty manifest polls
    /// nothing; it never aborts.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(m) => m,
            Err(e) => {
                if path.exists() {
                    warn!(error = %e, "plugin manifest unusable, polling nothing");
                } else {
                    debug!(path = %path.display(), "no plugin manifest, polling nothing");
                }
                Self::empty()
            }
        }
    }

    /// Strict variant of [`PluginManifest::load`] for diagnostics.
    pub fn try_load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PolldError::ManifestLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|e| PolldError::ManifestLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Parse manifest JSON. The document must be an object; an individual
    /// entry that does not describe a plugin is skipped with a warning so one
    /// broken entry does not disable every other plugin.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(text)?;
        let mut entries = BTreeMap::new();
        for (key, value) in raw {
            match serde_json::from_value::<PluginManifestEntry>(value) {
                Ok(mut entry) => {
                    if entry.exec.as_os_str().is_empty() {
                        warn!(plugin = %key, "manifest entry has an empty exec path, skipping");
                        continue;
                    }
                    entry.plugin_id = key.clone();
                    entries.insert(key, entry);
                }
                Err(e) => warn!(plugin = %key, error = %e, "skipping malformed manifest entry"),
            }
        }
        Ok(Self { entries })
    }

    pub fn from_entries(entries: impl IntoIterator<Item = PluginManifestEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| (e.plugin_id.clone(), e))
                .collect(),
        }
    }

    pub fn lookup(&self, plugin_id: &str) -> Option<&PluginManifestEntry> {
        self.entries.get(plugin_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &PluginManifestEntry> {
        self.entries.values()
    }
}

// ---------------------------------------------------------------------------
// ManifestSource
// ---------------------------------------------------------------------------

/// Where the poller gets a fresh manifest at the start of every cycle.
#[derive(Debug, Clone)]
pub enum ManifestSource {
    File(PathBuf),
    Fixed(PluginManifest),
}

impl ManifestSource {
    /// Fetch the manifest for a new cycle. File reads run on the blocking
    /// pool; any failure degrades to an empty manifest.
    pub async fn load(&self) -> PluginManifest {
        match self {
            ManifestSource::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || PluginManifest::load(&path))
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "manifest load task failed, polling nothing");
                        PluginManifest::empty()
                    })
            }
            ManifestSource::Fixed(m) => m.clone(),
        }
    }
}

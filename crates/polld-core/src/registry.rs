//! The account registry seam.
//!
//! [`AccountRegistry`] is the interface the poller consumes: list enabled
//! accounts, list each account's enabled services with their credentials,
//! and invalidate credentials the remote service rejected. Two
//! implementations ship here: [`FileAccountRegistry`] backed by
//! `accounts.yaml`, and [`MemoryAccountRegistry`] for tests and embedding.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::{PolldError, Result};
use crate::io;
use crate::types::AuthPayload;

/// One enabled service under an account, as reported by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct EnabledService {
    pub service_id: String,
    /// Plugin key for this service. `None` means the service id is the key.
    pub plugin_id: Option<String>,
    pub auth: AuthPayload,
}

impl EnabledService {
    pub fn plugin_key(&self) -> &str {
        self.plugin_id.as_deref().unwrap_or(&self.service_id)
    }
}

#[async_trait]
pub trait AccountRegistry: Send + Sync {
    /// Ids of all enabled accounts, in a stable order.
    async fn list_enabled_accounts(&self) -> Result<Vec<u32>>;

    /// Enabled services of `account_id`, in a stable order.
    async fn list_enabled_services(&self, account_id: u32) -> Result<Vec<EnabledService>>;

    /// The remote side rejected the stored credentials; make sure they are
    /// refreshed before the account is polled again.
    async fn invalidate_credentials(
        &self,
        plugin_id: &str,
        account_id: u32,
        service_id: &str,
    ) -> Result<()>;
}

// ---------------------------------------------------------------------------
// On-disk model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountsFile {
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: u32,
    #[serde(default)]
    pub provider: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "AuthPayload::is_empty")]
    pub auth: AuthPayload,
    /// Set when a plugin reported the stored credentials as rejected.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auth_invalidated: bool,
}

fn default_true() -> bool {
    true
}

impl AccountsFile {
    fn enabled_account_ids(&self) -> Vec<u32> {
        self.accounts
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.id)
            .collect()
    }

    fn enabled_services(&self, account_id: u32) -> Result<Vec<EnabledService>> {
        let account = self
            .accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or(PolldError::AccountNotFound(account_id))?;
        if !account.enabled {
            return Ok(Vec::new());
        }
        Ok(account
            .services
            .iter()
            .filter(|s| s.enabled)
            .map(|s| EnabledService {
                service_id: s.id.clone(),
                plugin_id: s.plugin.clone(),
                auth: s.auth.clone(),
            })
            .collect())
    }

    /// Returns true when a matching service was found.
    fn invalidate(&mut self, plugin_id: &str, account_id: u32, service_id: &str) -> bool {
        let Some(service) = self
            .accounts
            .iter_mut()
            .filter(|a| a.id == account_id)
            .flat_map(|a| a.services.iter_mut())
            .find(|s| s.id == service_id && s.plugin.as_deref().unwrap_or(&s.id) == plugin_id)
        else {
            return false;
        };
        service.auth.clear();
        service.auth_invalidated = true;
        true
    }
}

// ---------------------------------------------------------------------------
// FileAccountRegistry
// ---------------------------------------------------------------------------

/// Registry backed by a YAML file, re-read on every call so edits made by
/// other tools are picked up by the next cycle.
pub struct FileAccountRegistry {
    path: PathBuf,
    // Serializes read-modify-write on invalidation.
    write_lock: tokio::sync::Mutex<()>,
}

impl FileAccountRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means no accounts are configured.
    pub fn read(&self) -> Result<AccountsFile> {
        read_accounts(&self.path)
    }

    async fn read_blocking(&self) -> Result<AccountsFile> {
        let path = self.path.clone();
        io::blocking(move || read_accounts(&path)).await
    }
}

fn read_accounts(path: &Path) -> Result<AccountsFile> {
    if !path.exists() {
        return Ok(AccountsFile::default());
    }
    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(AccountsFile::default());
    }
    Ok(serde_yaml::from_str(&text)?)
}

fn write_accounts(path: &Path, file: &AccountsFile) -> Result<()> {
    let text = serde_yaml::to_string(file)?;
    io::atomic_write(path, text.as_bytes())
}

#[async_trait]
impl AccountRegistry for FileAccountRegistry {
    async fn list_enabled_accounts(&self) -> Result<Vec<u32>> {
        Ok(self.read_blocking().await?.enabled_account_ids())
    }

    async fn list_enabled_services(&self, account_id: u32) -> Result<Vec<EnabledService>> {
        self.read_blocking()
            .await?
            .enabled_services(account_id)
            .map_err(|e| PolldError::AccountEnumeration {
                account_id,
                reason: e.to_string(),
            })
    }

    async fn invalidate_credentials(
        &self,
        plugin_id: &str,
        account_id: u32,
        service_id: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        let (plugin, service) = (plugin_id.to_string(), service_id.to_string());
        let found = io::blocking(move || {
            let mut file = read_accounts(&path)?;
            if !file.invalidate(&plugin, account_id, &service) {
                return Ok(false);
            }
            write_accounts(&path, &file)?;
            Ok(true)
        })
        .await?;
        if !found {
            debug!(
                plugin = plugin_id,
                account = account_id,
                service = service_id,
                "credentials to invalidate not found"
            );
            return Ok(());
        }
        info!(
            plugin = plugin_id,
            account = account_id,
            service = service_id,
            "credentials invalidated"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryAccountRegistry
// ---------------------------------------------------------------------------

/// In-memory registry. Records every invalidation request so callers can
/// inspect them, and can be told to fail enumeration for specific accounts.
#[derive(Default)]
pub struct MemoryAccountRegistry {
    file: Mutex<AccountsFile>,
    broken: Mutex<Vec<u32>>,
    invalidated: Mutex<Vec<(String, u32, String)>>,
}

impl MemoryAccountRegistry {
    pub fn new(file: AccountsFile) -> Self {
        Self {
            file: Mutex::new(file),
            ..Default::default()
        }
    }

    /// Make `list_enabled_services(account_id)` fail.
    pub fn break_account(&self, account_id: u32) {
        if let Ok(mut b) = self.broken.lock() {
            b.push(account_id);
        }
    }

    /// Every `(plugin_id, account_id, service_id)` passed to
    /// `invalidate_credentials`, in call order.
    pub fn invalidated(&self) -> Vec<(String, u32, String)> {
        self.invalidated
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> AccountsFile {
        self.file.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AccountRegistry for MemoryAccountRegistry {
    async fn list_enabled_accounts(&self) -> Result<Vec<u32>> {
        Ok(self.snapshot().enabled_account_ids())
    }

    async fn list_enabled_services(&self, account_id: u32) -> Result<Vec<EnabledService>> {
        let broken = self
            .broken
            .lock()
            .map(|b| b.contains(&account_id))
            .unwrap_or(false);
        if broken {
            return Err(PolldError::AccountEnumeration {
                account_id,
                reason: "registry unavailable".into(),
            });
        }
        self.snapshot().enabled_services(account_id)
    }

    async fn invalidate_credentials(
        &self,
        plugin_id: &str,
        account_id: u32,
        service_id: &str,
    ) -> Result<()> {
        if let Ok(mut v) = self.invalidated.lock() {
            v.push((plugin_id.to_string(), account_id, service_id.to_string()));
        }
        if let Ok(mut f) = self.file.lock() {
            f.invalidate(plugin_id, account_id, service_id);
        }
        Ok(())
    }
}

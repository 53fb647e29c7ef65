use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::registry::AccountRegistry;
use crate::types::AccountData;

/// One step of an account scan.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    AccountReady(AccountData),
    /// Always the last event of a scan.
    Finished,
}

/// A running scan. Events arrive on `events`; dropping the scan (or calling
/// [`AccountScan::abort`]) stops the enumeration.
pub struct AccountScan {
    pub events: mpsc::Receiver<WatchEvent>,
    task: JoinHandle<()>,
}

impl AccountScan {
    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for AccountScan {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Turns the registry's account listing into a finite sequence of
/// [`WatchEvent::AccountReady`] events terminated by [`WatchEvent::Finished`].
#[derive(Clone)]
pub struct AccountWatcher {
    registry: Arc<dyn AccountRegistry>,
}

impl AccountWatcher {
    pub fn new(registry: Arc<dyn AccountRegistry>) -> Self {
        Self { registry }
    }

    /// Start a scan in the background.
    ///
    /// The channel is small on purpose: the scan suspends while the consumer
    /// is busy instead of buffering the whole registry.
    pub fn scan(&self) -> AccountScan {
        let (tx, rx) = mpsc::channel(16);
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move {
            if scan_accounts(registry.as_ref(), &tx).await.is_err() {
                return; // receiver dropped
            }
            let _ = tx.send(WatchEvent::Finished).await;
        });
        AccountScan { events: rx, task }
    }

    /// Run a full scan and collect the work items. Convenience for callers
    /// that do not need streaming (CLI listing, tests).
    pub async fn collect(&self) -> Vec<AccountData> {
        let mut scan = self.scan();
        let mut items = Vec::new();
        while let Some(event) = scan.events.recv().await {
            match event {
                WatchEvent::AccountReady(data) => items.push(data),
                WatchEvent::Finished => break,
            }
        }
        items
    }
}

/// Emit one `AccountReady` per enabled (account, service) pair. An account
/// whose services cannot be listed is logged and skipped.
///
/// Returns `Err(())` only when the receiver has gone away.
async fn scan_accounts(
    registry: &dyn AccountRegistry,
    tx: &mpsc::Sender<WatchEvent>,
) -> std::result::Result<(), ()> {
    let accounts = match registry.list_enabled_accounts().await {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "failed to list accounts, nothing to poll");
            return Ok(());
        }
    };
    debug!(count = accounts.len(), "enabled accounts");

    for account_id in accounts {
        let services = match registry.list_enabled_services(account_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!(account = account_id, error = %e, "skipping account");
                continue;
            }
        };
        for service in services {
            let plugin = service.plugin_key().to_string();
            let data = AccountData::new(
                plugin,
                account_id,
                service.service_id,
                service.auth,
            );
            tx.send(WatchEvent::AccountReady(data))
                .await
                .map_err(|_| ())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AccountsFile, MemoryAccountRegistry};

    fn accounts(yaml: &str) -> Arc<MemoryAccountRegistry> {
        let file: AccountsFile = serde_yaml::from_str(yaml).unwrap();
        Arc::new(MemoryAccountRegistry::new(file))
    }

    const TWO_ACCOUNTS: &str = r#"
accounts:
  - id: 1
    services:
      - id: coolmail
      - id: coolshare
        plugin: share_helper
  - id: 2
    services:
      - id: coolmail
"#;

    #[tokio::test]
    async fn emits_one_item_per_enabled_service_then_finished() {
        let watcher = AccountWatcher::new(accounts(TWO_ACCOUNTS));
        let mut scan = watcher.scan();
        let mut events = Vec::new();
        while let Some(ev) = scan.events.recv().await {
            events.push(ev);
        }
        assert_eq!(events.len(), 4);
        assert_eq!(events.last(), Some(&WatchEvent::Finished));
        assert!(events[..3]
            .iter()
            .all(|e| matches!(e, WatchEvent::AccountReady(_))));
    }

    #[tokio::test]
    async fn order_follows_registry_listing() {
        let watcher = AccountWatcher::new(accounts(TWO_ACCOUNTS));
        let items = watcher.collect().await;
        let keys: Vec<String> = items.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            keys,
            vec!["coolmail:1/coolmail", "share_helper:1/coolshare", "coolmail:2/coolmail"]
        );
    }

    #[tokio::test]
    async fn broken_account_is_skipped_not_fatal() {
        let registry = accounts(TWO_ACCOUNTS);
        registry.break_account(1);
        let watcher = AccountWatcher::new(registry);
        let items = watcher.collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].account_id, 2);
    }

    #[tokio::test]
    async fn no_accounts_yields_only_finished() {
        let watcher = AccountWatcher::new(accounts("accounts: []"));
        let mut scan = watcher.scan();
        assert_eq!(scan.events.recv().await, Some(WatchEvent::Finished));
        assert_eq!(scan.events.recv().await, None);
    }
}

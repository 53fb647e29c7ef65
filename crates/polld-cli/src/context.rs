use anyhow::Context as _;
use plugin_runner::PluginInvoker;
use polld_core::config::{Config, PushConfig};
use polld_core::push::{FilePushSink, HttpPushSink, LogPushSink, PushSink};
use polld_core::registry::FileAccountRegistry;
use polld_core::{paths, ManifestSource, PollHandle, Poller, PollerOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// The loaded configuration plus the collaborators built from it.
pub struct Context {
    pub config_path: PathBuf,
    pub config: Config,
}

impl Context {
    /// Load the config from `explicit`, or the default location.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match explicit {
            Some(p) => p.to_path_buf(),
            None => paths::default_config_path()?,
        };
        let config = Config::load(&config_path)
            .with_context(|| format!("failed to load config {}", config_path.display()))?;
        Ok(Self {
            config_path,
            config,
        })
    }

    pub fn manifest_path(&self) -> anyhow::Result<PathBuf> {
        Ok(self.config.manifest_path()?)
    }

    pub fn registry(&self) -> anyhow::Result<Arc<FileAccountRegistry>> {
        Ok(Arc::new(FileAccountRegistry::new(self.config.accounts_path()?)))
    }

    pub fn push_sink(&self) -> anyhow::Result<Arc<dyn PushSink>> {
        Ok(match &self.config.push {
            PushConfig::Log => Arc::new(LogPushSink),
            PushConfig::File { path } => {
                let path = match path {
                    Some(p) => p.clone(),
                    None => paths::default_push_log_path()?,
                };
                Arc::new(FilePushSink::new(path))
            }
            PushConfig::Http { url, timeout_secs } => {
                Arc::new(HttpPushSink::new(url.clone(), Duration::from_secs(*timeout_secs))?)
            }
        })
    }

    /// Build and start the poller. Must be called inside a Tokio runtime.
    pub fn spawn_poller(&self) -> anyhow::Result<PollHandle> {
        let options = PollerOptions::from_config(&self.config)?;
        let poller = Poller::new(
            self.registry()?,
            Arc::new(PluginInvoker::from_config(&self.config)),
            self.push_sink()?,
            ManifestSource::File(self.manifest_path()?),
            options,
        );
        Ok(poller.spawn())
    }
}

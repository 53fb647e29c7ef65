pub mod config;
pub mod error;
pub mod invocation;
pub mod io;
pub mod manifest;
pub mod orchestrator;
pub mod paths;
pub mod push;
pub mod registry;
pub mod types;
pub mod watcher;

pub use error::{InvocationError, PolldError, Result};
pub use invocation::{InvocationResult, Invoker};
pub use manifest::{ManifestSource, PluginManifest, PluginManifestEntry};
pub use orchestrator::{PollHandle, PollSignal, Poller, PollerOptions};
pub use types::{AccountData, NotificationRecord, PushMessage};

//! `plugin-runner` launches notification plugins as confined subprocesses.
//!
//! # Protocol
//!
//! ```text
//! PluginInvoker::invoke(AccountData, PluginManifestEntry, timeout)
//!     │
//!     ▼
//! Sandbox         ← `<exec> <args>` or `<launcher with {profile}> <exec> <args>`
//!     │
//!     ▼
//! PluginProcess   ← stdin:  {"accountId":4,"serviceId":"mail","auth":{...}}
//!     │              stdout: {"type":"notification","appId":..,"message":..,"notification":{..}}
//!     │                      {"type":"auth_failure"}
//!     ▼
//! InvocationResult ← exit 0 → Success, exit 3 or auth_failure → AuthFailure,
//!                    anything else → Error
//! ```
//!
//! Credentials are only sent when the manifest entry sets
//! `needsAuthenticationData`, and only ever on stdin.

pub mod error;
pub mod invoker;
pub mod sandbox;
pub mod types;

pub(crate) mod process;


pub use error::PluginRunError;
pub use invoker::PluginInvoker;
pub use sandbox::Sandbox;
pub use types::{PluginLine, PluginRequest, AUTH_REJECTED_EXIT_CODE};

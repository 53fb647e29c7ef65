//! The poll orchestrator.
//!
//! A [`Poller`] owns one coordinator task that runs poll cycles:
//!
//! ```text
//! PollHandle::request_poll()
//!     │
//!     ▼
//! Coordinator ── AccountWatcher::scan() ──► AccountReady* … Finished
//!     │              │
//!     │              ▼
//!     │          PluginManifest::lookup()  (no entry → skipped)
//!     │              │
//!     │              ▼
//!     │          JoinSet of Invoker tasks, admitted by a Semaphore
//!     │              │
//!     ▼              ▼
//! results ──► PushSink::post()  /  AccountRegistry::invalidate_credentials()
//!     │
//!     ▼
//! PollSignal::Done (or Cancelled), exactly once per accepted request
//! ```
//!
//! At most one cycle runs at a time. Requests arriving mid-cycle are queued
//! up to `max_queued`, each getting its own cycle; further requests are
//! rejected with [`crate::PolldError::OverlappingPollRequest`].

pub mod cycle;
pub mod poller;


pub use cycle::{CycleCounters, CyclePhase, CycleSummary};
pub use poller::{PollAccepted, PollHandle, PollSignal, PollStatus, Poller, PollerOptions};

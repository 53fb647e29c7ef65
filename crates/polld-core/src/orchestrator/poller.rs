use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::cycle::{CyclePhase, CycleState, CycleSummary};
use crate::config::{check_positive, Config};
use crate::error::{InvocationError, PolldError, Result};
use crate::invocation::{InvocationResult, Invoker};
use crate::manifest::{ManifestSource, PluginManifest};
use crate::push::PushSink;
use crate::registry::AccountRegistry;
use crate::types::AccountData;
use crate::watcher::{AccountScan, AccountWatcher, WatchEvent};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PollerOptions {
    /// Size of the limiter bounding concurrent plugin processes.
    pub max_concurrent: usize,
    pub plugin_timeout: Duration,
    /// Requests accepted while a cycle is running.
    pub max_queued: usize,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            plugin_timeout: Duration::from_secs(30),
            max_queued: 1,
        }
    }
}

impl PollerOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            max_concurrent: check_positive("max_concurrent_plugins", config.max_concurrent_plugins)?,
            plugin_timeout: config.plugin_timeout(),
            max_queued: config.max_queued_polls,
        })
    }
}

/// Answer to an accepted poll request. `cycle` is the sequence number the
/// request's cycle will carry in its [`CycleSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollAccepted {
    Started { cycle: u64 },
    Queued { cycle: u64, position: usize },
}

impl PollAccepted {
    pub fn cycle(&self) -> u64 {
        match self {
            PollAccepted::Started { cycle } | PollAccepted::Queued { cycle, .. } => *cycle,
        }
    }
}

/// End-of-cycle notification. Exactly one is emitted per accepted request.
#[derive(Debug, Clone, PartialEq)]
pub enum PollSignal {
    Done(CycleSummary),
    Cancelled(CycleSummary),
}

impl PollSignal {
    pub fn summary(&self) -> &CycleSummary {
        match self {
            PollSignal::Done(s) | PollSignal::Cancelled(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollStatus {
    pub phase: CyclePhase,
    /// Sequence number of the running (or last) cycle; 0 before the first.
    pub cycle: u64,
    pub queued: usize,
    pub cycles_completed: u64,
    pub cycles_cancelled: u64,
    pub last_cycle: Option<CycleSummary>,
}

enum Command {
    Poll(oneshot::Sender<Result<PollAccepted>>),
    Cancel(oneshot::Sender<bool>),
    Shutdown(oneshot::Sender<()>),
}

// ---------------------------------------------------------------------------
// PollHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable control handle for a running poller.
#[derive(Clone)]
pub struct PollHandle {
    cmd_tx: mpsc::Sender<Command>,
    signals: broadcast::Sender<PollSignal>,
    status: watch::Receiver<PollStatus>,
}

impl PollHandle {
    /// Ask for a poll. Returns once the request is accepted, not when the
    /// cycle ends; watch [`PollHandle::subscribe`] for that.
    pub async fn request_poll(&self) -> Result<PollAccepted> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Poll(tx))
            .await
            .map_err(|_| PolldError::PollerStopped)?;
        rx.await.map_err(|_| PolldError::PollerStopped)?
    }

    /// Cancel the running cycle. Returns false when the poller was idle.
    pub async fn cancel(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Cancel(tx))
            .await
            .map_err(|_| PolldError::PollerStopped)?;
        rx.await.map_err(|_| PolldError::PollerStopped)
    }

    /// Cancel the running cycle and every queued request, then stop the
    /// poller. Each of them still gets its `Cancelled` signal.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Shutdown(tx))
            .await
            .map_err(|_| PolldError::PollerStopped)?;
        rx.await.map_err(|_| PolldError::PollerStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PollSignal> {
        self.signals.subscribe()
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    /// Request a poll and wait for the signal that ends its cycle.
    pub async fn poll_and_wait(&self) -> Result<PollSignal> {
        let mut signals = self.subscribe();
        let target = self.request_poll().await?.cycle();
        loop {
            let received = tokio::select! {
                biased;
                r = signals.recv() => r,
                // The coordinator exited without running our cycle.
                _ = self.cmd_tx.closed() => return Err(PolldError::PollerStopped),
            };
            match received {
                Ok(signal) if signal.summary().seq == target => return Ok(signal),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "poll signal receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(PolldError::PollerStopped),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// The poll orchestrator.
///
/// One coordinator task owns all cycle state. It consumes the account scan,
/// resolves each work item against the manifest, dispatches invoker tasks
/// through a fixed-size limiter and funnels their results back through a
/// single [`JoinSet`], so the state needs no locking.
pub struct Poller {
    registry: Arc<dyn AccountRegistry>,
    invoker: Arc<dyn Invoker>,
    sink: Arc<dyn PushSink>,
    manifest: ManifestSource,
    options: PollerOptions,
}

impl Poller {
    pub fn new(
        registry: Arc<dyn AccountRegistry>,
        invoker: Arc<dyn Invoker>,
        sink: Arc<dyn PushSink>,
        manifest: ManifestSource,
        options: PollerOptions,
    ) -> Self {
        Self {
            registry,
            invoker,
            sink,
            manifest,
            options,
        }
    }

    /// Start the coordinator task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> PollHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (signals, _) = broadcast::channel(16);
        let (status_tx, status_rx) = watch::channel(PollStatus::default());

        let coordinator = Coordinator {
            limiter: Arc::new(Semaphore::new(self.options.max_concurrent.max(1))),
            watcher: AccountWatcher::new(Arc::clone(&self.registry)),
            poller: self,
            cmd_rx,
            signals: signals.clone(),
            status: status_tx,
            queued: 0,
            seq: 0,
        };
        tokio::spawn(coordinator.run());

        PollHandle {
            cmd_tx,
            signals,
            status: status_rx,
        }
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Stop,
}

struct Coordinator {
    poller: Poller,
    watcher: AccountWatcher,
    limiter: Arc<Semaphore>,
    cmd_rx: mpsc::Receiver<Command>,
    signals: broadcast::Sender<PollSignal>,
    status: watch::Sender<PollStatus>,
    queued: usize,
    /// Sequence number of the last cycle started.
    seq: u64,
}

impl Coordinator {
    async fn run(mut self) {
        loop {
            if self.queued > 0 {
                self.queued -= 1;
                let queued = self.queued;
                self.status.send_modify(|s| s.queued = queued);
                if let Flow::Stop = self.run_cycle().await {
                    break;
                }
                continue;
            }

            match self.cmd_rx.recv().await {
                None => break,
                Some(Command::Poll(reply)) => {
                    let _ = reply.send(Ok(PollAccepted::Started {
                        cycle: self.seq + 1,
                    }));
                    if let Flow::Stop = self.run_cycle().await {
                        break;
                    }
                }
                Some(Command::Cancel(reply)) => {
                    let _ = reply.send(false);
                }
                Some(Command::Shutdown(reply)) => {
                    self.cancel_queued();
                    let _ = reply.send(());
                    break;
                }
            }
        }
        debug!("poller stopped");
    }

    fn enqueue(&mut self) -> Result<PollAccepted> {
        if self.queued >= self.poller.options.max_queued {
            warn!(
                queued = self.queued,
                "rejecting poll request: cycle in progress and queue full"
            );
            return Err(PolldError::OverlappingPollRequest);
        }
        self.queued += 1;
        let queued = self.queued;
        self.status.send_modify(|s| s.queued = queued);
        debug!(position = queued, "poll request queued");
        Ok(PollAccepted::Queued {
            cycle: self.seq + queued as u64,
            position: queued,
        })
    }

    fn set_phase(&self, phase: CyclePhase) {
        self.status.send_modify(|s| s.phase = phase);
    }

    async fn run_cycle(&mut self) -> Flow {
        self.seq += 1;
        let manifest = Arc::new(self.poller.manifest.load().await);
        let mut state = CycleState::new(self.seq);
        let seq = self.seq;
        self.status.send_modify(|s| {
            s.phase = CyclePhase::Scanning;
            s.cycle = seq;
        });
        info!(cycle = %state.id, seq, plugins = manifest.len(), "poll cycle started");

        let mut scan = self.watcher.scan();
        let mut tasks: JoinSet<TaskReport> = JoinSet::new();
        let mut commands_open = true;

        while !state.is_done() {
            tokio::select! {
                event = scan.events.recv(), if !state.scan_finished => match event {
                    Some(WatchEvent::AccountReady(data)) => {
                        self.dispatch(&mut state, &mut tasks, &manifest, data);
                    }
                    Some(WatchEvent::Finished) => self.scan_finished(&mut state),
                    None => {
                        warn!(cycle = %state.id, "account scan ended without completion marker");
                        self.scan_finished(&mut state);
                    }
                },
                Some(joined) = tasks.join_next_with_id(), if !tasks.is_empty() => {
                    state.counters.completed += 1;
                    let (id, report) = match joined {
                        Ok((id, report)) => (id, report),
                        Err(e) => {
                            warn!(cycle = %state.id, error = %e, "plugin invocation task failed");
                            (e.id(), TaskReport::Failed)
                        }
                    };
                    if state.pending.remove(&id).is_none() {
                        warn!(cycle = %state.id, "result for unknown invocation dropped");
                    }
                    Self::record(&mut state, report);
                },
                cmd = self.cmd_rx.recv(), if commands_open => match cmd {
                    None => commands_open = false,
                    Some(Command::Poll(reply)) => {
                        let _ = reply.send(self.enqueue());
                    }
                    Some(Command::Cancel(reply)) => {
                        self.abort_cycle(state, scan, tasks).await;
                        let _ = reply.send(true);
                        return Flow::Continue;
                    }
                    Some(Command::Shutdown(reply)) => {
                        self.abort_cycle(state, scan, tasks).await;
                        self.cancel_queued();
                        let _ = reply.send(());
                        return Flow::Stop;
                    }
                },
                else => break,
            }
        }

        let summary = state.finish(false);
        info!(
            cycle = %summary.id,
            seq = summary.seq,
            dispatched = summary.counters.dispatched,
            skipped = summary.counters.skipped,
            pushed = summary.counters.pushed,
            auth_failures = summary.counters.auth_failures,
            errors = summary.counters.errors,
            "poll cycle done"
        );
        self.status.send_modify(|s| {
            s.phase = CyclePhase::Idle;
            s.cycles_completed += 1;
            s.last_cycle = Some(summary.clone());
        });
        let _ = self.signals.send(PollSignal::Done(summary));
        Flow::Continue
    }

    fn scan_finished(&self, state: &mut CycleState) {
        state.scan_finished = true;
        debug!(
            cycle = %state.id,
            outstanding = state.outstanding(),
            "account scan finished"
        );
        if !state.is_done() {
            self.set_phase(state.phase());
        }
    }

    fn dispatch(
        &self,
        state: &mut CycleState,
        tasks: &mut JoinSet<TaskReport>,
        manifest: &PluginManifest,
        data: AccountData,
    ) {
        state.counters.scanned += 1;
        let Some(entry) = manifest.lookup(&data.plugin_id) else {
            // Not every service has a plugin.
            state.counters.skipped += 1;
            debug!(
                plugin = %data.plugin_id,
                account = data.account_id,
                service = %data.service_id,
                "no plugin for service"
            );
            return;
        };

        // Counted before the task exists, so no completion can be observed
        // ahead of its dispatch.
        state.counters.dispatched += 1;

        let entry = entry.clone();
        let limiter = Arc::clone(&self.limiter);
        let invoker = Arc::clone(&self.poller.invoker);
        let sink = Arc::clone(&self.poller.sink);
        let registry = Arc::clone(&self.poller.registry);
        let timeout = self.poller.options.plugin_timeout;
        let task_data = data.clone();
        debug!(cycle = %state.id, item = %data, "dispatching plugin");

        let handle = tasks.spawn(async move {
            // Waiting here is the back-pressure point: items queue, never drop.
            let result = match limiter.acquire_owned().await {
                Ok(_permit) => invoker.invoke(&task_data, &entry, timeout).await,
                Err(_) => InvocationResult::Error(InvocationError::Aborted(
                    "concurrency limiter closed".into(),
                )),
            };
            deliver(&task_data, result, sink.as_ref(), registry.as_ref()).await
        });
        state.pending.insert(handle.id(), data);
    }

    fn record(state: &mut CycleState, report: TaskReport) {
        match report {
            TaskReport::Succeeded {
                pushed,
                push_failures,
            } => {
                state.counters.succeeded += 1;
                state.counters.pushed += pushed;
                state.counters.push_failures += push_failures;
            }
            TaskReport::AuthFailed => state.counters.auth_failures += 1,
            TaskReport::Failed => state.counters.errors += 1,
        }
    }

    /// Answer every queued request with a `Cancelled` signal of its own.
    fn cancel_queued(&mut self) {
        while self.queued > 0 {
            self.queued -= 1;
            self.seq += 1;
            let summary = CycleState::new(self.seq).finish(true);
            debug!(cycle = %summary.id, seq = summary.seq, "queued poll request dropped");
            let (queued, seq) = (self.queued, self.seq);
            self.status.send_modify(|s| {
                s.queued = queued;
                s.cycle = seq;
                s.cycles_cancelled += 1;
                s.last_cycle = Some(summary.clone());
            });
            let _ = self.signals.send(PollSignal::Cancelled(summary));
        }
    }

    /// Stop the scan, abort every invocation task (dropping a task kills its
    /// plugin process) and emit `Cancelled`. Notifications already pushed stay
    /// pushed.
    async fn abort_cycle(
        &mut self,
        mut state: CycleState,
        scan: AccountScan,
        mut tasks: JoinSet<TaskReport>,
    ) {
        scan.abort();
        drop(scan);
        tasks.abort_all();
        while let Some(joined) = tasks.join_next().await {
            state.counters.completed += 1;
            if let Ok(report) = joined {
                Self::record(&mut state, report);
            }
        }
        state.pending.clear();

        let summary = state.finish(true);
        info!(
            cycle = %summary.id,
            seq = summary.seq,
            dispatched = summary.counters.dispatched,
            pushed = summary.counters.pushed,
            "poll cycle cancelled"
        );
        self.status.send_modify(|s| {
            s.phase = CyclePhase::Idle;
            s.cycles_cancelled += 1;
            s.last_cycle = Some(summary.clone());
        });
        let _ = self.signals.send(PollSignal::Cancelled(summary));
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// What an invocation task hands back to the coordinator once its plugin has
/// run and its results have been delivered.
enum TaskReport {
    Succeeded { pushed: usize, push_failures: usize },
    AuthFailed,
    Failed,
}

/// Push a successful invocation's records, or report rejected credentials
/// to the registry. Runs inside the invocation task, off the coordinator.
async fn deliver(
    data: &AccountData,
    result: InvocationResult,
    sink: &dyn PushSink,
    registry: &dyn AccountRegistry,
) -> TaskReport {
    debug!(item = %data, result = result.kind(), "plugin finished");
    match result {
        InvocationResult::Success(records) => {
            debug!(item = %data, notifications = records.len(), "plugin succeeded");
            let mut pushed = 0;
            let mut push_failures = 0;
            for record in &records {
                match sink.post(record).await {
                    Ok(()) => pushed += 1,
                    Err(e) => {
                        push_failures += 1;
                        warn!(
                            plugin = %data.plugin_id,
                            account = data.account_id,
                            app_id = %record.app_id,
                            error = %e,
                            "push delivery failed"
                        );
                    }
                }
            }
            TaskReport::Succeeded {
                pushed,
                push_failures,
            }
        }
        InvocationResult::AuthFailure(failed) => {
            info!(
                plugin = %failed.plugin_id,
                account = failed.account_id,
                service = %failed.service_id,
                "credentials rejected, invalidating"
            );
            if let Err(e) = registry
                .invalidate_credentials(&failed.plugin_id, failed.account_id, &failed.service_id)
                .await
            {
                warn!(item = %failed, error = %e, "failed to invalidate credentials");
            }
            TaskReport::AuthFailed
        }
        InvocationResult::Error(e) => {
            warn!(
                plugin = %data.plugin_id,
                account = data.account_id,
                service = %data.service_id,
                error = %e,
                "plugin invocation failed"
            );
            TaskReport::Failed
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::AccountData;

/// Lifecycle of the poller.
///
/// Transitions: `Idle → Scanning → Draining → Idle`. `Scanning` lasts until
/// the account scan reports completion; `Draining` until every dispatched
/// invocation has reported back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    #[default]
    Idle,
    Scanning,
    Draining,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounters {
    /// Work items received from the account scan.
    pub scanned: usize,
    /// Work items without a manifest entry.
    pub skipped: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub auth_failures: usize,
    pub errors: usize,
    pub pushed: usize,
    pub push_failures: usize,
}

/// What happened in one finished (or cancelled) cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    pub id: Uuid,
    /// 1-based sequence number within this poller's lifetime.
    pub seq: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    #[serde(flatten)]
    pub counters: CycleCounters,
}

/// Bookkeeping for the cycle in progress. Owned by the coordinator task and
/// only ever touched from there.
pub(crate) struct CycleState {
    pub id: Uuid,
    pub seq: u64,
    pub started_at: DateTime<Utc>,
    pub scan_finished: bool,
    pub counters: CycleCounters,
    /// Work item behind every invocation task still running.
    pub pending: HashMap<tokio::task::Id, AccountData>,
}

impl CycleState {
    pub fn new(seq: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq,
            started_at: Utc::now(),
            scan_finished: false,
            counters: CycleCounters::default(),
            pending: HashMap::new(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.counters.dispatched - self.counters.completed
    }

    /// The cycle is over once the scan has ended and nothing is in flight.
    pub fn is_done(&self) -> bool {
        self.scan_finished && self.outstanding() == 0
    }

    pub fn phase(&self) -> CyclePhase {
        if self.scan_finished {
            CyclePhase::Draining
        } else {
            CyclePhase::Scanning
        }
    }

    pub fn finish(self, cancelled: bool) -> CycleSummary {
        CycleSummary {
            id: self.id,
            seq: self.seq,
            started_at: self.started_at,
            finished_at: Utc::now(),
            cancelled,
            counters: self.counters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_done_while_scanning() {
        let state = CycleState::new(1);
        assert!(!state.is_done());
        assert_eq!(state.phase(), CyclePhase::Scanning);
    }

    #[test]
    fn done_when_scan_finished_and_nothing_dispatched() {
        let mut state = CycleState::new(1);
        state.scan_finished = true;
        assert!(state.is_done());
    }

    #[test]
    fn draining_until_all_completed() {
        let mut state = CycleState::new(1);
        state.counters.dispatched = 2;
        state.scan_finished = true;
        assert_eq!(state.phase(), CyclePhase::Draining);
        assert!(!state.is_done());
        state.counters.completed = 1;
        assert!(!state.is_done());
        state.counters.completed = 2;
        assert!(state.is_done());
    }

    #[test]
    fn summary_flattens_counters() {
        let mut state = CycleState::new(7);
        state.counters.pushed = 3;
        let json = serde_json::to_value(state.finish(false)).unwrap();
        assert_eq!(json["seq"], 7);
        assert_eq!(json["pushed"], 3);
        assert_eq!(json["cancelled"], false);
    }
}

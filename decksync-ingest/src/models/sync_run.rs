//! Sync run state machine
//!
//! Each phase (tournaments, then decks) walks
//! FETCHING → PARSING → RESOLVING → PERSISTING, and the run ends in
//! COMPLETED, or FAILED when the catalog or storage is unreachable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::sync_result::{SyncIssue, SyncRunResult};

/// Pipeline state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncState {
    /// Downloading listing pages or decklist documents
    Fetching,
    /// Turning documents into stubs and decks
    Parsing,
    /// Mapping card mentions onto the catalog
    Resolving,
    /// Writing tournaments, decks and deck cards
    Persisting,
    /// Run finished (possibly with recorded issues)
    Completed,
    /// Catalog or storage unreachable
    Failed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Fetching => "fetching",
            SyncState::Parsing => "parsing",
            SyncState::Resolving => "resolving",
            SyncState::Persisting => "persisting",
            SyncState::Completed => "completed",
            SyncState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Completed | SyncState::Failed)
    }
}

/// Which half of the run a state belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Tournaments,
    Decks,
}

/// Recorded state change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub phase: SyncPhase,
    pub old_state: SyncState,
    pub new_state: SyncState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory state of one sync run
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub run_id: Uuid,
    pub phase: SyncPhase,
    pub state: SyncState,
    pub transitions: Vec<StateTransition>,
    /// Counters and issues accumulated so far
    pub result: SyncRunResult,
}

impl SyncRun {
    pub fn new() -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            phase: SyncPhase::Tournaments,
            state: SyncState::Fetching,
            transitions: Vec::new(),
            result: SyncRunResult::new(run_id),
        }
    }

    /// Move to `new_state` within `phase`
    pub fn transition_to(&mut self, phase: SyncPhase, new_state: SyncState) -> StateTransition {
        let transition = StateTransition {
            run_id: self.run_id,
            phase,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };

        tracing::info!(
            run_id = %self.run_id,
            phase = ?phase,
            from = self.state.as_str(),
            to = new_state.as_str(),
            "Sync state transition"
        );

        self.phase = phase;
        self.state = new_state;
        self.result.state = new_state;
        if new_state.is_terminal() {
            self.result.finish();
        }

        self.transitions.push(transition.clone());
        transition
    }

    /// Record a per-item issue; never changes state
    pub fn record(&mut self, issue: SyncIssue) {
        self.result.record(issue);
    }

    /// States visited so far, in order
    pub fn visited_states(&self) -> Vec<(SyncPhase, SyncState)> {
        self.transitions
            .iter()
            .map(|t| (t.phase, t.new_state))
            .collect()
    }
}

impl Default for SyncRun {
    fn default() -> Self {
        Self::new()
    }
}

//! Run summary and per-item issues
//!
//! Every problem met during a run becomes a [`SyncIssue`] with enough context
//! (stage, natural key or URL) for an operator to act on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::sync_run::SyncState;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Fetch failed (after retries for transient failures)
    Network,
    /// Document or item could not be parsed
    Parse,
    /// Card mention matched nothing in the catalog
    ResolutionMiss,
    /// Card mention matched several catalog entries
    ResolutionAmbiguous,
    /// Storage rejected the entity
    Persistence,
    /// Noteworthy but nothing was skipped
    Warning,
    /// Run aborted
    Fatal,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Network => "network_error",
            IssueKind::Parse => "parse_error",
            IssueKind::ResolutionMiss => "resolution_miss",
            IssueKind::ResolutionAmbiguous => "resolution_ambiguous",
            IssueKind::Persistence => "persistence_error",
            IssueKind::Warning => "warning",
            IssueKind::Fatal => "fatal_error",
        }
    }
}

/// How much of the run an issue affected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueSeverity {
    /// Nothing skipped
    Warning,
    /// One item (page, tournament, deck or card line) skipped
    Skip,
    /// Run cannot continue
    Critical,
}

/// One recorded problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncIssue {
    pub stage: SyncState,
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    /// Source URL or natural key of the affected entity
    pub context: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl SyncIssue {
    pub fn warning(stage: SyncState, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage, IssueKind::Warning, IssueSeverity::Warning, context, message)
    }

    pub fn skip(
        stage: SyncState,
        kind: IssueKind,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(stage, kind, IssueSeverity::Skip, context, message)
    }

    pub fn critical(stage: SyncState, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(stage, IssueKind::Fatal, IssueSeverity::Critical, context, message)
    }

    fn new(
        stage: SyncState,
        kind: IssueKind,
        severity: IssueSeverity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            kind,
            severity,
            context: context.into(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }
}

impl fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.stage.as_str(),
            self.kind.as_str(),
            self.context,
            self.message
        )
    }
}

/// Summary returned to the caller of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRunResult {
    pub run_id: Uuid,
    pub state: SyncState,
    /// False when the run was cut short by timeout or cancellation
    pub complete: bool,
    pub tournaments_created: usize,
    pub tournaments_updated: usize,
    pub decks_created: usize,
    pub decks_updated: usize,
    /// Raw names that matched nothing, each once, first-seen order
    pub unresolved_cards: Vec<String>,
    /// Raw names that matched several catalog entries
    pub ambiguous_cards: Vec<String>,
    /// Human-readable rendering of `issues`, same order
    pub errors: Vec<String>,
    pub issues: Vec<SyncIssue>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
}

impl SyncRunResult {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: SyncState::Fetching,
            complete: true,
            tournaments_created: 0,
            tournaments_updated: 0,
            decks_created: 0,
            decks_updated: 0,
            unresolved_cards: Vec::new(),
            ambiguous_cards: Vec::new(),
            errors: Vec::new(),
            issues: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: 0,
        }
    }

    /// Append an issue and its rendered line
    pub fn record(&mut self, issue: SyncIssue) {
        tracing::warn!(
            run_id = %self.run_id,
            stage = issue.stage.as_str(),
            kind = issue.kind.as_str(),
            context = %issue.context,
            "{}",
            issue.message
        );
        self.errors.push(issue.to_string());
        self.issues.push(issue);
    }

    pub fn note_unresolved(&mut self, raw_name: &str) {
        if !self.unresolved_cards.iter().any(|n| n == raw_name) {
            self.unresolved_cards.push(raw_name.to_string());
        }
    }

    pub fn note_ambiguous(&mut self, raw_name: &str) {
        if !self.ambiguous_cards.iter().any(|n| n == raw_name) {
            self.ambiguous_cards.push(raw_name.to_string());
        }
    }

    /// Count issues of one kind
    pub fn count_by_kind(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    /// Stamp end time and duration
    pub fn finish(&mut self) {
        let ended_at = Utc::now();
        self.duration_ms = (ended_at - self.started_at).num_milliseconds().max(0) as u64;
        self.ended_at = Some(ended_at);
    }

    pub fn total_created(&self) -> usize {
        self.tournaments_created + self.decks_created
    }
}

//! Data models for decksync-ingest
//!
//! - Sync run state machine and run summary
//! - Tournament / deck / card records
//! - Per-run parameters

pub mod parameters;
pub mod records;
pub mod sync_result;
pub mod sync_run;

pub use parameters::SyncParameters;
pub use records::{
    CardMention, CardRef, Deck, DeckCard, DeckFields, DeckKey, RawDocument, Tournament,
    TournamentKey, TournamentStub, UpsertOutcome,
};
pub use sync_result::{IssueKind, IssueSeverity, SyncIssue, SyncRunResult};
pub use sync_run::{StateTransition, SyncPhase, SyncRun, SyncState};

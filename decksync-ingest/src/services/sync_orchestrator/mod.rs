//! Sync orchestrator
//!
//! Drives one sync run through its state machine:
//!
//! ```text
//! Tournaments: FETCHING → PARSING → PERSISTING
//! Decks:       FETCHING → PARSING → RESOLVING → PERSISTING
//!              → COMPLETED | FAILED
//! ```
//!
//! Each phase lives in its own `phase_*` module. Per-item problems become
//! [`SyncIssue`]s on the run result and never fail the run; only an
//! unreachable catalog or storage does (see [`FatalError`]).
//!
//! A run timeout and operator cancellation share one discipline: no new fetch
//! starts, in-flight fetches finish, and everything fetched is still parsed,
//! resolved and persisted. The result is then marked `complete = false`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{IssueKind, SyncIssue, SyncParameters, SyncRun, SyncRunResult, SyncState};
use crate::services::card_resolver::CardResolver;
use crate::services::parsing::ParseIssue;
use crate::types::{CardCatalog, GatewayError, PersistenceGateway, SourceError, TournamentSource};
use crate::utils::KeyedLocks;

mod phase_decks;
mod phase_tournaments;

/// Condition that aborts a run
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FatalError {
    #[error("card catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),
}

impl FatalError {
    pub fn code(&self) -> &'static str {
        match self {
            FatalError::CatalogUnavailable(_) => "CATALOG_UNAVAILABLE",
            FatalError::PersistenceUnavailable(_) => "PERSISTENCE_UNAVAILABLE",
        }
    }
}

/// Aborted run: the fatal error plus everything done before it
#[derive(Debug, Clone, Error)]
#[error("sync run {} failed: {error}", .partial.run_id)]
pub struct SyncFailure {
    pub error: FatalError,
    /// Partial result, state `FAILED`
    pub partial: SyncRunResult,
}

/// Run-scoped state shared by the phases; dropped when the run ends
struct RunContext {
    params: SyncParameters,
    source: String,
    /// Cancelled by the operator token or the run timer
    stop: CancellationToken,
    resolver: CardResolver,
    tournament_locks: KeyedLocks,
    deck_locks: KeyedLocks,
}

impl RunContext {
    fn stopped(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Sync orchestrator service
pub struct SyncOrchestrator {
    source: Arc<dyn TournamentSource>,
    catalog: Arc<dyn CardCatalog>,
    gateway: Arc<dyn PersistenceGateway>,
    defaults: SyncParameters,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn TournamentSource>,
        catalog: Arc<dyn CardCatalog>,
        gateway: Arc<dyn PersistenceGateway>,
        defaults: SyncParameters,
    ) -> Self {
        Self {
            source,
            catalog,
            gateway,
            defaults,
        }
    }

    /// Parameters used when a trigger supplies none
    pub fn defaults(&self) -> &SyncParameters {
        &self.defaults
    }

    pub fn source_name(&self) -> &str {
        self.source.source_name()
    }

    /// Execute one complete sync run
    ///
    /// Returns the run result (state `COMPLETED`), or a [`SyncFailure`]
    /// carrying the partial result when the catalog or storage is unreachable.
    pub async fn run(
        &self,
        params: SyncParameters,
        cancel_token: CancellationToken,
    ) -> Result<SyncRunResult, SyncFailure> {
        let mut run = SyncRun::new();
        let stop = cancel_token.child_token();
        let timed_out = Arc::new(AtomicBool::new(false));

        tracing::info!(
            run_id = %run.run_id,
            source = self.source.source_name(),
            page_cap = params.page_cap,
            workers = params.workers(),
            timeout_secs = params.run_timeout_secs,
            deck_scope = ?params.deck_scope,
            "Starting sync run"
        );

        let timer = params.run_timeout().map(|limit| {
            let stop = stop.clone();
            let timed_out = timed_out.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        timed_out.store(true, Ordering::SeqCst);
                        stop.cancel();
                    }
                    _ = stop.cancelled() => {}
                }
            })
        });

        let ctx = RunContext {
            source: self.source.source_name().to_string(),
            stop,
            resolver: CardResolver::new(self.catalog.clone()),
            tournament_locks: KeyedLocks::new(),
            deck_locks: KeyedLocks::new(),
            params,
        };

        let outcome = match self.phase_tournaments(&mut run, &ctx).await {
            Ok(unstored) => self.phase_decks(&mut run, &ctx, &unstored).await,
            Err(e) => Err(e),
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        if ctx.stopped() {
            run.result.complete = false;
            let message = if timed_out.load(Ordering::SeqCst) {
                format!(
                    "run timed out after {}s; fetching stopped early and the result is partial",
                    ctx.params.run_timeout_secs
                )
            } else {
                "run cancelled; fetching stopped early and the result is partial".to_string()
            };
            run.record(SyncIssue::warning(run.state, "run", message));
        }

        tracing::debug!(
            run_id = %run.run_id,
            states = ?run.visited_states(),
            catalog_queries = ctx.resolver.catalog_queries(),
            tournament_keys = ctx.tournament_locks.len(),
            deck_keys = ctx.deck_locks.len(),
            "Run-scoped state released"
        );

        match outcome {
            Ok(()) => {
                run.transition_to(run.phase, SyncState::Completed);
                tracing::info!(
                    run_id = %run.run_id,
                    complete = run.result.complete,
                    tournaments_created = run.result.tournaments_created,
                    tournaments_updated = run.result.tournaments_updated,
                    decks_created = run.result.decks_created,
                    decks_updated = run.result.decks_updated,
                    issues = run.result.issues.len(),
                    duration_ms = run.result.duration_ms,
                    "Sync run completed"
                );
                Ok(run.result)
            }
            Err(error) => {
                run.record(SyncIssue::critical(run.state, "run", error.to_string()));
                run.transition_to(run.phase, SyncState::Failed);
                tracing::error!(run_id = %run.run_id, error = %error, "Sync run failed");
                Err(SyncFailure {
                    error,
                    partial: run.result,
                })
            }
        }
    }
}

/// Parser finding → run issue
fn parse_issue(issue: ParseIssue) -> SyncIssue {
    if issue.is_error() {
        SyncIssue::skip(SyncState::Parsing, IssueKind::Parse, issue.context, issue.message)
    } else {
        SyncIssue::warning(SyncState::Parsing, issue.context, issue.message)
    }
}

/// Failed fetch → run issue for the item it was fetching
fn fetch_issue(context: impl Into<String>, err: &SourceError) -> SyncIssue {
    SyncIssue::skip(SyncState::Fetching, IssueKind::Network, context, err.to_string())
}

/// Per-entity storage failure → run issue; unreachable storage → fatal
fn persistence_issue(context: impl Into<String>, err: GatewayError) -> Result<SyncIssue, FatalError> {
    if err.is_fatal() {
        return Err(FatalError::PersistenceUnavailable(err.to_string()));
    }
    Ok(SyncIssue::skip(
        SyncState::Persisting,
        IssueKind::Persistence,
        context,
        err.to_string(),
    ))
}

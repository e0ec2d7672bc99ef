//! Tournament phase: listing pages → tournament stubs → tournaments
//!
//! Returns the keys whose upsert failed in this run; the deck phase leaves
//! their decks alone.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};

use super::{fetch_issue, parse_issue, persistence_issue, FatalError, RunContext, SyncOrchestrator};
use crate::models::{SyncIssue, SyncPhase, SyncRun, SyncState, TournamentKey, UpsertOutcome};
use crate::services::listing_parser::{has_next_page, parse_listing};

impl SyncOrchestrator {
    pub(super) async fn phase_tournaments(
        &self,
        run: &mut SyncRun,
        ctx: &RunContext,
    ) -> Result<HashSet<TournamentKey>, FatalError> {
        // FETCHING: page 1 onwards until the last page, a failed fetch or the page cap
        run.transition_to(SyncPhase::Tournaments, SyncState::Fetching);

        let mut documents = Vec::new();
        let mut page = 1;
        while page <= ctx.params.page_cap {
            if ctx.stopped() {
                tracing::info!(run_id = %run.run_id, page, "Run stopped, no further listing pages fetched");
                break;
            }

            match self.source.fetch_listing(page).await {
                Ok(doc) => {
                    let more = has_next_page(&doc);
                    documents.push(doc);
                    if !more {
                        break;
                    }
                    if page == ctx.params.page_cap {
                        tracing::info!(run_id = %run.run_id, page_cap = page, "Page cap reached, further listing pages ignored");
                    }
                }
                Err(e) => {
                    run.record(fetch_issue(format!("listing page {}", page), &e));
                    break;
                }
            }
            page += 1;
        }

        tracing::info!(run_id = %run.run_id, pages = documents.len(), "Listing pages fetched");

        // PARSING
        run.transition_to(SyncPhase::Tournaments, SyncState::Parsing);

        let mut seen = HashSet::new();
        let mut stubs = Vec::new();
        for doc in &documents {
            let listing = parse_listing(doc);
            for issue in listing.issues.iter().cloned() {
                run.record(parse_issue(issue));
            }
            for stub in listing.into_stubs() {
                let key = TournamentKey::new(&ctx.source, &stub.external_id);
                if seen.insert(key.clone()) {
                    stubs.push((key, stub));
                } else {
                    run.record(SyncIssue::warning(
                        SyncState::Parsing,
                        key.to_string(),
                        "tournament listed more than once in this run, processed once",
                    ));
                }
            }
        }

        // PERSISTING: one upsert per natural key, serialized per key
        run.transition_to(SyncPhase::Tournaments, SyncState::Persisting);

        let results: Vec<_> = stream::iter(stubs)
            .map(|(key, stub)| async move {
                let _guard = ctx.tournament_locks.lock(&key.to_string()).await;
                let result = self.gateway.upsert_tournament(&key, &stub).await;
                (key, result)
            })
            .buffered(ctx.params.workers())
            .collect()
            .await;

        let mut unstored = HashSet::new();
        for (key, result) in results {
            match result {
                Ok((id, outcome)) => {
                    tracing::debug!(run_id = %run.run_id, tournament = %key, id = %id, outcome = ?outcome, "Tournament persisted");
                    match outcome {
                        UpsertOutcome::Created => run.result.tournaments_created += 1,
                        UpsertOutcome::Updated => run.result.tournaments_updated += 1,
                    }
                }
                Err(e) => {
                    run.record(persistence_issue(key.to_string(), e)?);
                    unstored.insert(key);
                }
            }
        }

        tracing::info!(
            run_id = %run.run_id,
            created = run.result.tournaments_created,
            updated = run.result.tournaments_updated,
            unstored = unstored.len(),
            "Tournament phase finished"
        );

        Ok(unstored)
    }
}

//! Deck phase: known tournaments → decklist pages → resolved decks → decks + deck cards

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};

use super::{fetch_issue, parse_issue, persistence_issue, FatalError, RunContext, SyncOrchestrator};
use crate::models::{
    CardMention, CardRef, DeckCard, DeckFields, DeckKey, IssueKind, SyncIssue, SyncPhase, SyncRun,
    SyncState, Tournament, TournamentKey, UpsertOutcome,
};
use crate::services::card_resolver::ResolutionResult;
use crate::services::decklist_parser::{parse_decklists, ParsedDeck};
use crate::types::GatewayError;

/// Deck ready for storage
struct PreparedDeck {
    key: DeckKey,
    context: String,
    fields: DeckFields,
    cards: Vec<DeckCard>,
}

/// What storage made of one prepared deck
struct DeckWrite {
    context: String,
    deck: Result<UpsertOutcome, GatewayError>,
    /// `None` when the deck upsert already failed
    cards: Option<Result<UpsertOutcome, GatewayError>>,
}

impl SyncOrchestrator {
    /// `unstored`: tournaments whose upsert failed in this run; their decks are skipped
    pub(super) async fn phase_decks(
        &self,
        run: &mut SyncRun,
        ctx: &RunContext,
        unstored: &HashSet<TournamentKey>,
    ) -> Result<(), FatalError> {
        // FETCHING
        run.transition_to(SyncPhase::Decks, SyncState::Fetching);

        let mut tournaments = match self
            .gateway
            .list_tournaments(&ctx.source, ctx.params.deck_scope)
            .await
        {
            Ok(tournaments) => tournaments,
            Err(e) => {
                run.record(persistence_issue(format!("tournaments of {}", ctx.source), e)?);
                Vec::new()
            }
        };

        // Tournaments that failed to store this run keep their stored decks untouched
        tournaments.retain(|tournament| {
            let key = tournament.key();
            if !unstored.contains(&key) {
                return true;
            }
            run.record(SyncIssue::skip(
                SyncState::Fetching,
                IssueKind::Persistence,
                key.to_string(),
                "tournament was not stored in this run, its decks are skipped",
            ));
            false
        });

        tracing::info!(
            run_id = %run.run_id,
            tournaments = tournaments.len(),
            scope = ?ctx.params.deck_scope,
            "Fetching decklists"
        );

        let fetched: Vec<_> = stream::iter(tournaments)
            .map(|tournament| async move {
                if ctx.stopped() {
                    return (tournament, None);
                }
                let result = self.source.fetch_tournament_detail(&tournament.external_id).await;
                (tournament, Some(result))
            })
            .buffered(ctx.params.workers())
            .collect()
            .await;

        let mut documents = Vec::new();
        let mut not_started = 0usize;
        for (tournament, result) in fetched {
            match result {
                Some(Ok(doc)) => documents.push((tournament, doc)),
                Some(Err(e)) => run.record(fetch_issue(tournament.key().to_string(), &e)),
                None => not_started += 1,
            }
        }
        if not_started > 0 {
            tracing::info!(run_id = %run.run_id, not_started, "Run stopped, remaining decklist fetches not started");
        }

        // PARSING
        run.transition_to(SyncPhase::Decks, SyncState::Parsing);

        let mut seen = HashSet::new();
        let mut decks: Vec<(Tournament, ParsedDeck)> = Vec::new();
        for (tournament, doc) in &documents {
            let page = parse_decklists(doc);
            for issue in page.issues {
                run.record(parse_issue(issue));
            }
            for mut deck in page.decks {
                for issue in std::mem::take(&mut deck.issues) {
                    run.record(parse_issue(issue));
                }
                let key = (tournament.id, deck.external_player_id.clone());
                if seen.insert(key) {
                    decks.push((tournament.clone(), deck));
                } else {
                    run.record(SyncIssue::warning(
                        SyncState::Parsing,
                        deck_context(tournament, &deck.external_player_id),
                        "deck listed more than once in this run, processed once",
                    ));
                }
            }
        }

        // RESOLVING: every distinct mention once, concurrently
        run.transition_to(SyncPhase::Decks, SyncState::Resolving);

        let mut unique = HashSet::new();
        let mentions: Vec<CardMention> = decks
            .iter()
            .flat_map(|(_, deck)| deck.leader.iter().chain(deck.cards.iter()))
            .filter(|mention| unique.insert(mention.cache_key()))
            .cloned()
            .collect();

        let resolved: Vec<_> = stream::iter(mentions)
            .map(|mention| async move {
                let result = ctx.resolver.resolve(&mention).await;
                (mention.cache_key(), result)
            })
            .buffered(ctx.params.workers())
            .collect()
            .await;

        let mut resolutions = HashMap::new();
        for (key, result) in resolved {
            let resolution = result.map_err(|e| FatalError::CatalogUnavailable(e.to_string()))?;
            resolutions.insert(key, resolution);
        }

        let prepared: Vec<PreparedDeck> = decks
            .into_iter()
            .map(|(tournament, deck)| prepare_deck(run, &resolutions, &tournament, deck))
            .collect();

        // PERSISTING: deck row first, then its full card set
        run.transition_to(SyncPhase::Decks, SyncState::Persisting);

        let writes: Vec<DeckWrite> = stream::iter(prepared)
            .map(|deck| async move {
                let _guard = ctx.deck_locks.lock(&deck.key.to_string()).await;
                match self.gateway.upsert_deck(&deck.key, &deck.fields).await {
                    Ok((deck_id, outcome)) => {
                        let cards = self.gateway.replace_deck_cards(deck_id, &deck.cards).await;
                        DeckWrite {
                            context: deck.context,
                            deck: Ok(outcome),
                            cards: Some(cards),
                        }
                    }
                    Err(e) => DeckWrite {
                        context: deck.context,
                        deck: Err(e),
                        cards: None,
                    },
                }
            })
            .buffered(ctx.params.workers())
            .collect()
            .await;

        for write in writes {
            match write.deck {
                Ok(UpsertOutcome::Created) => run.result.decks_created += 1,
                Ok(UpsertOutcome::Updated) => run.result.decks_updated += 1,
                Err(e) => {
                    run.record(persistence_issue(write.context, e)?);
                    continue;
                }
            }
            if let Some(Err(e)) = write.cards {
                run.record(persistence_issue(format!("{} cards", write.context), e)?);
            }
        }

        tracing::info!(
            run_id = %run.run_id,
            created = run.result.decks_created,
            updated = run.result.decks_updated,
            unresolved = run.result.unresolved_cards.len(),
            ambiguous = run.result.ambiguous_cards.len(),
            "Deck phase finished"
        );

        Ok(())
    }
}

fn deck_context(tournament: &Tournament, external_player_id: &str) -> String {
    format!("{} deck {}", tournament.key(), external_player_id)
}

/// Apply resolutions to one parsed deck, recording every line that could not be resolved
fn prepare_deck(
    run: &mut SyncRun,
    resolutions: &HashMap<(String, Option<String>), ResolutionResult>,
    tournament: &Tournament,
    deck: ParsedDeck,
) -> PreparedDeck {
    let context = deck_context(tournament, &deck.external_player_id);

    let leader = deck.leader.as_ref().and_then(|mention| {
        resolve_line(run, resolutions, &context, mention, "leader").cloned()
    });

    // Lines resolving to the same card are merged by summing quantities
    let mut cards: Vec<DeckCard> = Vec::new();
    for mention in &deck.cards {
        let Some(card) = resolve_line(run, resolutions, &context, mention, "card") else {
            continue;
        };
        match cards.iter_mut().find(|existing| &existing.card == card) {
            Some(existing) => match existing.quantity.checked_add(mention.quantity) {
                Some(total) => existing.quantity = total,
                None => run.record(SyncIssue::skip(
                    SyncState::Parsing,
                    IssueKind::Parse,
                    context.as_str(),
                    format!("card {} quantity overflows when merged, line skipped", mention),
                )),
            },
            None => cards.push(DeckCard {
                card: card.clone(),
                quantity: mention.quantity,
            }),
        }
    }

    PreparedDeck {
        key: DeckKey {
            tournament_id: tournament.id,
            external_player_id: deck.external_player_id,
        },
        context,
        fields: DeckFields {
            player: deck.player,
            placement: deck.placement,
            leader,
        },
        cards,
    }
}

/// Resolved card for one line, or `None` with the miss recorded
fn resolve_line<'a>(
    run: &mut SyncRun,
    resolutions: &'a HashMap<(String, Option<String>), ResolutionResult>,
    context: &str,
    mention: &CardMention,
    role: &str,
) -> Option<&'a CardRef> {
    match resolutions.get(&mention.cache_key())? {
        ResolutionResult::Resolved(card) => Some(card),
        ResolutionResult::Unresolved(raw_name) => {
            run.result.note_unresolved(raw_name);
            run.record(SyncIssue::skip(
                SyncState::Resolving,
                IssueKind::ResolutionMiss,
                context,
                format!("{} {} not found in catalog", role, mention),
            ));
            None
        }
        ResolutionResult::Ambiguous { raw_name, candidates } => {
            run.result.note_ambiguous(raw_name);
            let ids: Vec<&str> = candidates.iter().map(|c| c.as_str()).collect();
            run.record(SyncIssue::skip(
                SyncState::Resolving,
                IssueKind::ResolutionAmbiguous,
                context,
                format!("{} {} matches several catalog entries ({})", role, mention, ids.join(", ")),
            ));
            None
        }
    }
}

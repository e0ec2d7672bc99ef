//! SQLite [`PersistenceGateway`]
//!
//! Every call runs in its own transaction and is retried while SQLite reports
//! lock contention. Failures are then classified:
//! - constraint violations and similar statement errors → `Rejected`
//! - pool, I/O and exhausted lock retries → `Unavailable`

use decksync_common::config::DeckScope;
use decksync_common::Error;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{decks, tournaments};
use crate::models::{
    DeckCard, DeckFields, DeckKey, Tournament, TournamentKey, TournamentStub, UpsertOutcome,
};
use crate::types::{GatewayError, PersistenceGateway};
use crate::utils::retry_on_lock;

/// Default upper bound on lock-contention retries
const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Result of a tournament write attempt
enum TournamentWrite {
    Written(Uuid, UpsertOutcome),
    /// Stored record under the same key looks like a different tournament
    Collision(Tournament),
}

#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Same natural key, but neither name nor date agrees: the source renumbered
fn is_key_collision(existing: &Tournament, incoming: &TournamentStub) -> bool {
    existing.name != incoming.name && existing.date != incoming.date
}

fn classify(key: &str, err: Error) -> GatewayError {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => GatewayError::Rejected {
            key: key.to_string(),
            reason: db_err.to_string(),
        },
        Error::Database(sqlx::Error::RowNotFound)
        | Error::Database(sqlx::Error::ColumnDecode { .. })
        | Error::Database(sqlx::Error::Decode(_))
        | Error::InvalidInput(_)
        | Error::NotFound(_) => GatewayError::Rejected {
            key: key.to_string(),
            reason: err.to_string(),
        },
        other => GatewayError::Unavailable(other.to_string()),
    }
}

#[async_trait::async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn upsert_tournament(
        &self,
        key: &TournamentKey,
        stub: &TournamentStub,
    ) -> Result<(Uuid, UpsertOutcome), GatewayError> {
        let pool = &self.pool;
        let write = retry_on_lock("upsert_tournament", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            let write = match tournaments::find_by_key(&mut tx, key).await? {
                Some(existing) if is_key_collision(&existing, stub) => {
                    return Ok(TournamentWrite::Collision(existing));
                }
                Some(existing) => {
                    tournaments::update_tournament(&mut tx, existing.id, stub).await?;
                    TournamentWrite::Written(existing.id, UpsertOutcome::Updated)
                }
                None => {
                    let id = tournaments::insert_tournament(&mut tx, key, stub).await?;
                    TournamentWrite::Written(id, UpsertOutcome::Created)
                }
            };

            tx.commit().await?;
            Ok(write)
        })
        .await
        .map_err(|e| classify(&key.to_string(), e))?;

        match write {
            TournamentWrite::Written(id, outcome) => Ok((id, outcome)),
            TournamentWrite::Collision(existing) => Err(GatewayError::KeyCollision {
                key: key.to_string(),
                existing: format!("'{}' on {}", existing.name, existing.date),
            }),
        }
    }

    async fn upsert_deck(
        &self,
        key: &DeckKey,
        fields: &DeckFields,
    ) -> Result<(Uuid, UpsertOutcome), GatewayError> {
        let pool = &self.pool;
        retry_on_lock("upsert_deck", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            let written = match decks::find_by_key(&mut tx, key).await? {
                Some(existing) => {
                    decks::update_deck(&mut tx, existing.id, fields).await?;
                    (existing.id, UpsertOutcome::Updated)
                }
                None => (decks::insert_deck(&mut tx, key, fields).await?, UpsertOutcome::Created),
            };

            tx.commit().await?;
            Ok(written)
        })
        .await
        .map_err(|e| classify(&key.to_string(), e))
    }

    async fn replace_deck_cards(
        &self,
        deck_id: Uuid,
        cards: &[DeckCard],
    ) -> Result<UpsertOutcome, GatewayError> {
        let pool = &self.pool;
        retry_on_lock("replace_deck_cards", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;

            let outcome = if decks::count_cards(&mut tx, deck_id).await? == 0 {
                UpsertOutcome::Created
            } else {
                UpsertOutcome::Updated
            };
            decks::replace_cards(&mut tx, deck_id, cards).await?;

            tx.commit().await?;
            Ok(outcome)
        })
        .await
        .map_err(|e| classify(&format!("deck {}", deck_id), e))
    }

    async fn list_tournaments(
        &self,
        source: &str,
        scope: DeckScope,
    ) -> Result<Vec<Tournament>, GatewayError> {
        let pool = &self.pool;
        retry_on_lock("list_tournaments", self.max_lock_wait_ms, || async move {
            match scope {
                DeckScope::All => tournaments::list_for_source(pool, source).await,
                DeckScope::MissingDecks => tournaments::list_without_decks(pool, source).await,
            }
        })
        .await
        .map_err(|e| classify(source, e))
    }
}

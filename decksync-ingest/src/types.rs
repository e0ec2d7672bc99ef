//! Collaborator traits and their error types
//!
//! The orchestrator only talks to the outside world through these three seams:
//! - [`TournamentSource`]: the external tournament site
//! - [`CardCatalog`]: read-only card lookup
//! - [`PersistenceGateway`]: natural-key upserts of tournaments, decks and deck cards
//!
//! Production implementations live in `services::source_client` and `db`;
//! tests substitute in-memory doubles.

use decksync_common::config::DeckScope;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CardRef, DeckCard, DeckFields, DeckKey, RawDocument, Tournament, TournamentKey,
    TournamentStub, UpsertOutcome,
};

// ============================================================================
// Source
// ============================================================================

/// Fetch failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Worth retrying: timeout, connection failure, 5xx, 408, 429
    #[error("transient failure fetching {url}: {reason}")]
    Transient { url: String, reason: String },

    /// Not worth retrying: other 4xx, malformed URL, undecodable body
    #[error("terminal failure fetching {url}: {reason}")]
    Terminal { url: String, reason: String },

    /// Transient failures on every allowed attempt
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

impl SourceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Transient { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            SourceError::Transient { url, .. }
            | SourceError::Terminal { url, .. }
            | SourceError::Exhausted { url, .. } => url,
        }
    }
}

/// The external tournament site
#[async_trait::async_trait]
pub trait TournamentSource: Send + Sync {
    /// Identifier stored with every tournament from this source
    fn source_name(&self) -> &str;

    /// Fetch listing page `page` (1-based)
    async fn fetch_listing(&self, page: u32) -> Result<RawDocument, SourceError>;

    /// Fetch the decklist page of one tournament
    async fn fetch_tournament_detail(&self, external_id: &str) -> Result<RawDocument, SourceError>;
}

// ============================================================================
// Catalog
// ============================================================================

/// Catalog failure; always fatal for the run
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("card catalog unavailable: {0}")]
    Unavailable(String),
}

/// Read-only card lookup, safe for concurrent calls
#[async_trait::async_trait]
pub trait CardCatalog: Send + Sync {
    /// All catalog entries whose normalized name equals `normalized_name`,
    /// restricted to `region_hint` when given
    async fn lookup_card(
        &self,
        normalized_name: &str,
        region_hint: Option<&str>,
    ) -> Result<Vec<CardRef>, CatalogError>;
}

// ============================================================================
// Persistence
// ============================================================================

/// Storage failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Storage unreachable; fatal for the run
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Storage refused this entity; its sub-tree is skipped
    #[error("storage rejected {key}: {reason}")]
    Rejected { key: String, reason: String },

    /// Natural key already names an unrelated record
    #[error("natural key {key} already names a different record ({existing})")]
    KeyCollision { key: String, existing: String },
}

impl GatewayError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

/// Natural-key persistence; every call is atomic on its own
#[async_trait::async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn upsert_tournament(
        &self,
        key: &TournamentKey,
        stub: &TournamentStub,
    ) -> Result<(Uuid, UpsertOutcome), GatewayError>;

    async fn upsert_deck(
        &self,
        key: &DeckKey,
        fields: &DeckFields,
    ) -> Result<(Uuid, UpsertOutcome), GatewayError>;

    /// Replace the whole card set of a deck with `cards`
    async fn replace_deck_cards(
        &self,
        deck_id: Uuid,
        cards: &[DeckCard],
    ) -> Result<UpsertOutcome, GatewayError>;

    /// Tournaments of `source` the deck phase should visit
    async fn list_tournaments(
        &self,
        source: &str,
        scope: DeckScope,
    ) -> Result<Vec<Tournament>, GatewayError>;
}

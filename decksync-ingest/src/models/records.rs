//! Tournament, deck and card records flowing through the pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unparsed page body as returned by the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// URL the body was fetched from (used as issue context)
    pub url: String,
    pub body: String,
}

impl RawDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

/// Tournament as read from a listing page, before the source is attached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentStub {
    pub external_id: String,
    pub name: String,
    pub date: NaiveDate,
    /// Empty when the listing omits it
    pub location: String,
    pub standings_url: Option<String>,
}

/// Natural key of a tournament: `(source, external_id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TournamentKey {
    pub source: String,
    pub external_id: String,
}

impl TournamentKey {
    pub fn new(source: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for TournamentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.external_id)
    }
}

/// Stored tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: Uuid,
    pub source: String,
    pub external_id: String,
    pub name: String,
    pub date: NaiveDate,
    pub location: String,
    pub standings_url: Option<String>,
}

impl Tournament {
    pub fn key(&self) -> TournamentKey {
        TournamentKey::new(&self.source, &self.external_id)
    }
}

/// Canonical catalog identifier of a card
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardRef(pub String);

impl CardRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A card as written on a decklist, not yet resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardMention {
    pub raw_name: String,
    /// Set or region code printed next to the name, if any
    pub raw_set_hint: Option<String>,
    pub quantity: u32,
}

impl CardMention {
    pub fn new(raw_name: impl Into<String>, raw_set_hint: Option<String>, quantity: u32) -> Self {
        Self {
            raw_name: raw_name.into(),
            raw_set_hint,
            quantity,
        }
    }

    /// Identity used by the resolution cache (quantity does not matter)
    pub fn cache_key(&self) -> (String, Option<String>) {
        (self.raw_name.clone(), self.raw_set_hint.clone())
    }
}

impl fmt::Display for CardMention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.raw_set_hint {
            Some(hint) => write!(f, "'{}' ({})", self.raw_name, hint),
            None => write!(f, "'{}'", self.raw_name),
        }
    }
}

/// Natural key of a deck: `(tournament, external_player_id)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeckKey {
    pub tournament_id: Uuid,
    pub external_player_id: String,
}

impl fmt::Display for DeckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tournament_id, self.external_player_id)
    }
}

/// Mutable deck fields overwritten on every sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckFields {
    pub player: String,
    pub placement: Option<u32>,
    pub leader: Option<CardRef>,
}

/// Stored deck
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deck {
    pub id: Uuid,
    pub tournament_id: Uuid,
    pub external_player_id: String,
    pub player: String,
    pub placement: Option<u32>,
    pub leader: Option<CardRef>,
}

/// One resolved decklist line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckCard {
    pub card: CardRef,
    pub quantity: u32,
}

/// Whether an upsert inserted a new row or touched an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

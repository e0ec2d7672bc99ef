//! Service modules for the decklist ingestion pipeline
//!
//! Source client → parsers → card resolver → sync orchestrator

pub mod card_resolver;
pub mod decklist_parser;
pub mod listing_parser;
pub mod parsing;
pub mod source_client;
pub mod sync_orchestrator;

pub use card_resolver::{normalize_card_name, normalize_hint, CardResolver, ResolutionResult};
pub use decklist_parser::{parse_decklist, parse_decklists, DecklistPage, ParsedDeck};
pub use listing_parser::{has_next_page, parse_listing, ListingPage};
pub use parsing::{ParseIssue, ParseSeverity};
pub use source_client::HttpSourceClient;
pub use sync_orchestrator::{FatalError, SyncFailure, SyncOrchestrator};

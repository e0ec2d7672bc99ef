//! Database access for decksync-ingest
//!
//! SQLite tables, created idempotently at startup:
//! - `cards`: the card catalog (read-only to the pipeline)
//! - `tournaments`: unique on `(source, external_id)`
//! - `decks`: unique on `(tournament_id, external_player_id)`, cascade-deleted with their tournament
//! - `deck_cards`: keyed by `(deck_id, card_id)`

pub mod cards;
pub mod decks;
pub mod gateway;
pub mod tournaments;

pub use cards::SqliteCardCatalog;
pub use gateway::SqliteGateway;

use decksync_common::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Open (creating if needed) the database at `db_path`
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(250));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        tracing::info!("Initialized new database: {}", db_path.display());
    } else {
        tracing::info!("Opened existing database: {}", db_path.display());
    }

    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with all tables
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cards (
            card_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            set_code TEXT,
            normalized_name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cards_normalized_name ON cards(normalized_name)")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tournaments (
            guid TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            external_id TEXT NOT NULL,
            name TEXT NOT NULL,
            date TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            standings_url TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(source, external_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decks (
            guid TEXT PRIMARY KEY,
            tournament_id TEXT NOT NULL REFERENCES tournaments(guid) ON DELETE CASCADE,
            external_player_id TEXT NOT NULL,
            player TEXT NOT NULL,
            placement INTEGER,
            leader_card_id TEXT REFERENCES cards(card_id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(tournament_id, external_player_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deck_cards (
            deck_id TEXT NOT NULL REFERENCES decks(guid) ON DELETE CASCADE,
            card_id TEXT NOT NULL REFERENCES cards(card_id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            PRIMARY KEY (deck_id, card_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (cards, tournaments, decks, deck_cards)");

    Ok(())
}

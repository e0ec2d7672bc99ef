//! Tournament database operations

use decksync_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::models::{Tournament, TournamentKey, TournamentStub};

const COLUMNS: &str = "guid, source, external_id, name, date, location, standings_url";

/// Load a tournament by natural key
pub async fn find_by_key(conn: &mut SqliteConnection, key: &TournamentKey) -> Result<Option<Tournament>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM tournaments WHERE source = ? AND external_id = ?",
        COLUMNS
    ))
    .bind(&key.source)
    .bind(&key.external_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| from_row(&row)).transpose()
}

/// Insert a new tournament, returning its id
pub async fn insert_tournament(
    conn: &mut SqliteConnection,
    key: &TournamentKey,
    stub: &TournamentStub,
) -> Result<Uuid> {
    let guid = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO tournaments (guid, source, external_id, name, date, location, standings_url, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(guid.to_string())
    .bind(&key.source)
    .bind(&key.external_id)
    .bind(&stub.name)
    .bind(stub.date)
    .bind(&stub.location)
    .bind(&stub.standings_url)
    .execute(&mut *conn)
    .await?;

    Ok(guid)
}

/// Overwrite the mutable fields of an existing tournament
pub async fn update_tournament(conn: &mut SqliteConnection, guid: Uuid, stub: &TournamentStub) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE tournaments
        SET name = ?, date = ?, location = ?, standings_url = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(&stub.name)
    .bind(stub.date)
    .bind(&stub.location)
    .bind(&stub.standings_url)
    .bind(guid.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// All tournaments of one source, oldest first
pub async fn list_for_source(pool: &SqlitePool, source: &str) -> Result<Vec<Tournament>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM tournaments WHERE source = ? ORDER BY date, external_id",
        COLUMNS
    ))
    .bind(source)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Tournaments of one source that have no stored deck yet
pub async fn list_without_decks(pool: &SqlitePool, source: &str) -> Result<Vec<Tournament>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {} FROM tournaments t
        WHERE t.source = ?
          AND NOT EXISTS (SELECT 1 FROM decks d WHERE d.tournament_id = t.guid)
        ORDER BY t.date, t.external_id
        "#,
        COLUMNS
    ))
    .bind(source)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

pub async fn count_tournaments(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM tournaments")
        .fetch_one(pool)
        .await?)
}

pub(crate) fn parse_guid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("invalid guid '{}': {}", value, e)))
}

fn from_row(row: &SqliteRow) -> Result<Tournament> {
    let guid: String = row.try_get("guid")?;
    Ok(Tournament {
        id: parse_guid(&guid)?,
        source: row.try_get("source")?,
        external_id: row.try_get("external_id")?,
        name: row.try_get("name")?,
        date: row.try_get("date")?,
        location: row.try_get("location")?,
        standings_url: row.try_get("standings_url")?,
    })
}

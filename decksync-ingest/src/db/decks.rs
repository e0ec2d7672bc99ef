//! Deck and deck card database operations

use decksync_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::tournaments::parse_guid;
use crate::models::{CardRef, Deck, DeckCard, DeckFields, DeckKey};

const COLUMNS: &str = "guid, tournament_id, external_player_id, player, placement, leader_card_id";

/// Load a deck by natural key
pub async fn find_by_key(conn: &mut SqliteConnection, key: &DeckKey) -> Result<Option<Deck>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM decks WHERE tournament_id = ? AND external_player_id = ?",
        COLUMNS
    ))
    .bind(key.tournament_id.to_string())
    .bind(&key.external_player_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|row| from_row(&row)).transpose()
}

pub async fn insert_deck(conn: &mut SqliteConnection, key: &DeckKey, fields: &DeckFields) -> Result<Uuid> {
    let guid = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO decks (guid, tournament_id, external_player_id, player, placement, leader_card_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(guid.to_string())
    .bind(key.tournament_id.to_string())
    .bind(&key.external_player_id)
    .bind(&fields.player)
    .bind(fields.placement)
    .bind(fields.leader.as_ref().map(CardRef::as_str))
    .execute(&mut *conn)
    .await?;

    Ok(guid)
}

pub async fn update_deck(conn: &mut SqliteConnection, guid: Uuid, fields: &DeckFields) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE decks
        SET player = ?, placement = ?, leader_card_id = ?, updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(&fields.player)
    .bind(fields.placement)
    .bind(fields.leader.as_ref().map(CardRef::as_str))
    .bind(guid.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Number of card rows currently stored for a deck
pub async fn count_cards(conn: &mut SqliteConnection, deck_id: Uuid) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM deck_cards WHERE deck_id = ?")
        .bind(deck_id.to_string())
        .fetch_one(&mut *conn)
        .await?)
}

/// Delete every card row of a deck and insert `cards`
///
/// Run inside a transaction; lines naming the same card are summed.
pub async fn replace_cards(conn: &mut SqliteConnection, deck_id: Uuid, cards: &[DeckCard]) -> Result<()> {
    sqlx::query("DELETE FROM deck_cards WHERE deck_id = ?")
        .bind(deck_id.to_string())
        .execute(&mut *conn)
        .await?;

    for card in cards {
        sqlx::query(
            r#"
            INSERT INTO deck_cards (deck_id, card_id, quantity)
            VALUES (?, ?, ?)
            ON CONFLICT(deck_id, card_id) DO UPDATE SET
                quantity = quantity + excluded.quantity
            "#,
        )
        .bind(deck_id.to_string())
        .bind(card.card.as_str())
        .bind(card.quantity)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Decks of one tournament, by placement then player id
pub async fn load_decks_for_tournament(pool: &SqlitePool, tournament_id: Uuid) -> Result<Vec<Deck>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM decks WHERE tournament_id = ? ORDER BY placement IS NULL, placement, external_player_id",
        COLUMNS
    ))
    .bind(tournament_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Card rows of one deck, by card id
pub async fn load_deck_cards(pool: &SqlitePool, deck_id: Uuid) -> Result<Vec<DeckCard>> {
    let rows = sqlx::query("SELECT card_id, quantity FROM deck_cards WHERE deck_id = ? ORDER BY card_id")
        .bind(deck_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(DeckCard {
                card: CardRef::new(row.try_get::<String, _>("card_id")?),
                quantity: row.try_get("quantity")?,
            })
        })
        .collect()
}

pub async fn count_decks(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM decks")
        .fetch_one(pool)
        .await?)
}

fn from_row(row: &SqliteRow) -> Result<Deck> {
    let guid: String = row.try_get("guid")?;
    let tournament_id: String = row.try_get("tournament_id")?;
    let leader: Option<String> = row.try_get("leader_card_id")?;

    Ok(Deck {
        id: parse_guid(&guid)?,
        tournament_id: parse_guid(&tournament_id)?,
        external_player_id: row.try_get("external_player_id")?,
        player: row.try_get("player")?,
        placement: row.try_get("placement")?,
        leader: leader.map(CardRef::new),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{cards::insert_card, init_memory_pool, tournaments};
    use crate::models::{TournamentKey, TournamentStub};
    use chrono::NaiveDate;

    async fn setup() -> (SqlitePool, Uuid) {
        let pool = init_memory_pool().await.unwrap();
        insert_card(&pool, "OP01-016", "Nami", Some("OP01")).await.unwrap();
        insert_card(&pool, "OP01-025", "Roronoa Zoro", Some("OP01")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let tournament_id = tournaments::insert_tournament(
            &mut conn,
            &TournamentKey::new("tcg", "T1"),
            &TournamentStub {
                external_id: "T1".to_string(),
                name: "Regional".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
                location: String::new(),
                standings_url: None,
            },
        )
        .await
        .unwrap();
        drop(conn);

        (pool, tournament_id)
    }

    fn fields(player: &str) -> DeckFields {
        DeckFields {
            player: player.to_string(),
            placement: Some(1),
            leader: None,
        }
    }

    #[tokio::test]
    async fn test_replace_cards_leaves_only_new_snapshot() {
        let (pool, tournament_id) = setup().await;
        let key = DeckKey {
            tournament_id,
            external_player_id: "p-1".to_string(),
        };

        let mut conn = pool.acquire().await.unwrap();
        let deck_id = insert_deck(&mut conn, &key, &fields("Alice")).await.unwrap();
        replace_cards(
            &mut conn,
            deck_id,
            &[
                DeckCard { card: CardRef::new("OP01-016"), quantity: 3 },
                DeckCard { card: CardRef::new("OP01-025"), quantity: 4 },
            ],
        )
        .await
        .unwrap();
        replace_cards(
            &mut conn,
            deck_id,
            &[DeckCard { card: CardRef::new("OP01-016"), quantity: 2 }],
        )
        .await
        .unwrap();
        drop(conn);

        let cards = load_deck_cards(&pool, deck_id).await.unwrap();
        assert_eq!(cards, vec![DeckCard { card: CardRef::new("OP01-016"), quantity: 2 }]);
    }

    #[tokio::test]
    async fn test_unknown_card_is_rejected_by_foreign_key() {
        let (pool, tournament_id) = setup().await;
        let key = DeckKey {
            tournament_id,
            external_player_id: "p-1".to_string(),
        };
        let mut conn = pool.acquire().await.unwrap();
        let deck_id = insert_deck(&mut conn, &key, &fields("Alice")).await.unwrap();

        let result = replace_cards(
            &mut conn,
            deck_id,
            &[DeckCard { card: CardRef::new("NOPE-000"), quantity: 1 }],
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_decks_cascade_with_tournament() {
        let (pool, tournament_id) = setup().await;
        let key = DeckKey {
            tournament_id,
            external_player_id: "p-1".to_string(),
        };
        let mut conn = pool.acquire().await.unwrap();
        let found_before = insert_deck(&mut conn, &key, &fields("Alice")).await.unwrap();
        assert_eq!(find_by_key(&mut conn, &key).await.unwrap().unwrap().id, found_before);

        sqlx::query("DELETE FROM tournaments WHERE guid = ?")
            .bind(tournament_id.to_string())
            .execute(&mut *conn)
            .await
            .unwrap();
        drop(conn);

        assert_eq!(count_decks(&pool).await.unwrap(), 0);
    }
}

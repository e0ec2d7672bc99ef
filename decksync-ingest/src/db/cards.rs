//! Card catalog backed by the `cards` table
//!
//! The pipeline only reads this table. `insert_card` exists for seeding
//! (catalog import tooling and tests).

use decksync_common::Result;
use sqlx::SqlitePool;

use crate::models::CardRef;
use crate::services::card_resolver::normalize_card_name;
use crate::types::{CardCatalog, CatalogError};
use crate::utils::retry_on_lock;

/// Insert or update one catalog entry; the normalized name is derived from `name`
pub async fn insert_card(pool: &SqlitePool, card_id: &str, name: &str, set_code: Option<&str>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cards (card_id, name, set_code, normalized_name)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(card_id) DO UPDATE SET
            name = excluded.name,
            set_code = excluded.set_code,
            normalized_name = excluded.normalized_name
        "#,
    )
    .bind(card_id)
    .bind(name)
    .bind(set_code)
    .bind(normalize_card_name(name))
    .execute(pool)
    .await?;

    Ok(())
}

/// Card ids whose normalized name matches, restricted to `set_code` when given
pub async fn find_card_ids(pool: &SqlitePool, normalized_name: &str, set_code: Option<&str>) -> Result<Vec<String>> {
    let ids = match set_code {
        Some(set_code) => {
            sqlx::query_scalar(
                "SELECT card_id FROM cards WHERE normalized_name = ? AND UPPER(set_code) = ? ORDER BY card_id",
            )
            .bind(normalized_name)
            .bind(set_code.to_uppercase())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_scalar("SELECT card_id FROM cards WHERE normalized_name = ? ORDER BY card_id")
                .bind(normalized_name)
                .fetch_all(pool)
                .await?
        }
    };

    Ok(ids)
}

pub async fn count_cards(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM cards")
        .fetch_one(pool)
        .await?)
}

/// [`CardCatalog`] over the `cards` table
#[derive(Clone)]
pub struct SqliteCardCatalog {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteCardCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_lock_wait_ms: 5000,
        }
    }
}

#[async_trait::async_trait]
impl CardCatalog for SqliteCardCatalog {
    async fn lookup_card(
        &self,
        normalized_name: &str,
        region_hint: Option<&str>,
    ) -> std::result::Result<Vec<CardRef>, CatalogError> {
        let pool = &self.pool;
        let ids = retry_on_lock("lookup_card", self.max_lock_wait_ms, || async move {
            find_card_ids(pool, normalized_name, region_hint).await
        })
        .await
        .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        Ok(ids.into_iter().map(CardRef::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;

    #[tokio::test]
    async fn test_lookup_by_normalized_name_and_set() {
        let pool = init_memory_pool().await.unwrap();
        insert_card(&pool, "ST01-012", "Monkey.D.Luffy", Some("ST01")).await.unwrap();
        insert_card(&pool, "OP05-119", "Monkey.D.Luffy", Some("OP05")).await.unwrap();
        insert_card(&pool, "OP01-016", "Nami", Some("OP01")).await.unwrap();

        let catalog = SqliteCardCatalog::new(pool.clone());

        let both = catalog.lookup_card("monkey d luffy", None).await.unwrap();
        assert_eq!(both, vec![CardRef::new("OP05-119"), CardRef::new("ST01-012")]);

        let one = catalog.lookup_card("monkey d luffy", Some("st01")).await.unwrap();
        assert_eq!(one, vec![CardRef::new("ST01-012")]);

        assert!(catalog.lookup_card("zoro", None).await.unwrap().is_empty());
        assert_eq!(count_cards(&pool).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_closed_pool_reports_unavailable() {
        let pool = init_memory_pool().await.unwrap();
        let catalog = SqliteCardCatalog::new(pool.clone());
        pool.close().await;

        let result = catalog.lookup_card("nami", None).await;
        assert!(matches!(result, Err(CatalogError::Unavailable(_))));
    }
}

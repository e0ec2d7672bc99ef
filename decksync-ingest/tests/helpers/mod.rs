//! Test Helper Utilities
//!
//! Shared fixtures for decksync-ingest integration tests: an in-memory
//! tournament site, HTML page builders, a seeded catalog database and an
//! orchestrator wired to all of them.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::SqlitePool;

use decksync_ingest::db::{self, SqliteCardCatalog, SqliteGateway};
use decksync_ingest::models::{CardRef, RawDocument, SyncParameters};
use decksync_ingest::services::SyncOrchestrator;
use decksync_ingest::types::{CardCatalog, CatalogError, SourceError, TournamentSource};
use decksync_ingest::utils::{retry_transient, RetryPolicy};

pub const SOURCE: &str = "fixture";

/// Route test logs through the libtest writer; safe to call from every test
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decksync_ingest=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Fixture source
// ============================================================================

/// Scripted outcome for one URL, consumed before the stored page is served
#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Transient,
    Terminal,
}

/// In-memory tournament site
///
/// Serves listing and decklist pages from maps and applies the same
/// transient-failure retry as the HTTP client, with millisecond backoff.
pub struct FixtureSource {
    listings: Mutex<HashMap<u32, String>>,
    details: Mutex<HashMap<String, String>>,
    scripted: Mutex<HashMap<String, VecDeque<Failure>>>,
    always_failing: Mutex<HashMap<String, Failure>>,
    detail_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
    retry_policy: RetryPolicy,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self {
            listings: Mutex::new(HashMap::new()),
            details: Mutex::new(HashMap::new()),
            scripted: Mutex::new(HashMap::new()),
            always_failing: Mutex::new(HashMap::new()),
            detail_delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            retry_policy: RetryPolicy::new(3, Duration::from_millis(1)),
        }
    }

    pub fn listing_url(page: u32) -> String {
        format!("fixture://tournaments?page={}", page)
    }

    pub fn detail_url(external_id: &str) -> String {
        format!("fixture://tournaments/{}/decklists", external_id)
    }

    pub fn set_listing(&self, page: u32, body: String) {
        self.listings.lock().unwrap().insert(page, body);
    }

    pub fn set_detail(&self, external_id: &str, body: String) {
        self.details.lock().unwrap().insert(external_id.to_string(), body);
    }

    /// Fail the next `times` attempts on `url`, then serve normally
    pub fn fail_next(&self, url: &str, times: usize, failure: Failure) {
        self.scripted
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(std::iter::repeat(failure).take(times));
    }

    /// Fail every attempt on `url`
    pub fn fail_always(&self, url: &str, failure: Failure) {
        self.always_failing
            .lock()
            .unwrap()
            .insert(url.to_string(), failure);
    }

    /// Every decklist fetch sleeps this long before answering
    pub fn delay_details(&self, delay: Duration) {
        *self.detail_delay.lock().unwrap() = Some(delay);
    }

    /// URLs of every attempt, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == url).count()
    }

    fn attempt(&self, url: &str, stored: Option<String>) -> Result<RawDocument, SourceError> {
        self.calls.lock().unwrap().push(url.to_string());

        let failure = self
            .always_failing
            .lock()
            .unwrap()
            .get(url)
            .copied()
            .or_else(|| {
                self.scripted
                    .lock()
                    .unwrap()
                    .get_mut(url)
                    .and_then(|queue| queue.pop_front())
            });

        match failure {
            Some(Failure::Transient) => Err(SourceError::Transient {
                url: url.to_string(),
                reason: "HTTP 503".to_string(),
            }),
            Some(Failure::Terminal) => Err(SourceError::Terminal {
                url: url.to_string(),
                reason: "HTTP 403".to_string(),
            }),
            None => stored
                .map(|body| RawDocument::new(url, body))
                .ok_or_else(|| SourceError::Terminal {
                    url: url.to_string(),
                    reason: "HTTP 404".to_string(),
                }),
        }
    }
}

#[async_trait::async_trait]
impl TournamentSource for FixtureSource {
    fn source_name(&self) -> &str {
        SOURCE
    }

    async fn fetch_listing(&self, page: u32) -> Result<RawDocument, SourceError> {
        let url = Self::listing_url(page);
        retry_transient("fixture_listing", &self.retry_policy, || {
            let stored = self.listings.lock().unwrap().get(&page).cloned();
            let result = self.attempt(&url, stored);
            async move { result }
        })
        .await
    }

    async fn fetch_tournament_detail(&self, external_id: &str) -> Result<RawDocument, SourceError> {
        let url = Self::detail_url(external_id);
        let delay = *self.detail_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        retry_transient("fixture_detail", &self.retry_policy, || {
            let stored = self.details.lock().unwrap().get(external_id).cloned();
            let result = self.attempt(&url, stored);
            async move { result }
        })
        .await
    }
}

// ============================================================================
// Catalog doubles
// ============================================================================

/// Catalog whose backing store is unreachable
pub struct UnavailableCatalog;

#[async_trait::async_trait]
impl CardCatalog for UnavailableCatalog {
    async fn lookup_card(
        &self,
        _normalized_name: &str,
        _region_hint: Option<&str>,
    ) -> Result<Vec<CardRef>, CatalogError> {
        Err(CatalogError::Unavailable("catalog database offline".to_string()))
    }
}

// ============================================================================
// HTML builders
// ============================================================================

/// One listing row
pub struct Row<'a> {
    pub id: Option<&'a str>,
    pub name: &'a str,
    pub date: &'a str,
    pub location: &'a str,
}

pub fn row<'a>(id: &'a str, name: &'a str, date: &'a str) -> Row<'a> {
    Row {
        id: Some(id),
        name,
        date,
        location: "Berlin, DE",
    }
}

pub fn listing_html(rows: &[Row<'_>], next_page: Option<u32>) -> String {
    let mut html = String::from("<html><body><table>\n");
    for r in rows {
        match r.id {
            Some(id) => html.push_str(&format!(
                r#"<tr class="tournament" data-tournament-id="{id}"><td class="name"><a href="/tournaments/{id}/standings">{name}</a></td><td class="date"><time datetime="{date}">{date}</time></td><td class="location">{location}</td></tr>"#,
                id = id,
                name = r.name,
                date = r.date,
                location = r.location,
            )),
            None => html.push_str(&format!(
                r#"<tr class="tournament"><td class="name">{name}</td><td class="date"><time datetime="{date}">{date}</time></td><td class="location">{location}</td></tr>"#,
                name = r.name,
                date = r.date,
                location = r.location,
            )),
        }
        html.push('\n');
    }
    html.push_str("</table>\n");
    if let Some(next) = next_page {
        html.push_str(&format!(r#"<a class="next" href="/tournaments?page={}">Next</a>"#, next));
    }
    html.push_str("</body></html>");
    html
}

/// One decklist
pub struct DeckFixture {
    pub player_id: String,
    pub player: String,
    pub placement: u32,
    /// (name, set)
    pub leader: (String, String),
    /// Text lines such as `4x Nami (OP01)`
    pub lines: Vec<String>,
}

impl DeckFixture {
    pub fn new(player_id: &str, player: &str, placement: u32, lines: &[&str]) -> Self {
        Self {
            player_id: player_id.to_string(),
            player: player.to_string(),
            placement,
            leader: ("Monkey.D.Luffy".to_string(), "ST01".to_string()),
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }
}

pub fn decklist_html(decks: &[DeckFixture]) -> String {
    let mut html = String::from("<html><body><section>\n");
    for deck in decks {
        html.push_str(&format!(
            r#"<article class="deck" data-player-id="{}"><span class="player">{}</span><span class="placement">{}</span><div class="leader" data-set="{}">{}</div><ul class="cards">"#,
            deck.player_id, deck.player, deck.placement, deck.leader.1, deck.leader.0
        ));
        for line in &deck.lines {
            html.push_str(&format!(r#"<li class="card">{}</li>"#, line));
        }
        html.push_str("</ul></article>\n");
    }
    html.push_str("</section></body></html>");
    html
}

/// Standard 4-card main deck
pub const STANDARD_LINES: &[&str] = &[
    "4x Nami (OP01)",
    "4x Roronoa Zoro (OP01)",
    "2x Sanji (OP01)",
    "3x Usopp (OP01)",
];

/// `count` decks with ids p-1..p-count, all on the standard list
pub fn standard_decks(count: u32) -> Vec<DeckFixture> {
    (1..=count)
        .map(|n| DeckFixture::new(&format!("p-{}", n), &format!("Player {}", n), n, STANDARD_LINES))
        .collect()
}

// ============================================================================
// Database and orchestrator
// ============================================================================

/// In-memory database with a small catalog
///
/// "Monkey.D.Luffy" exists in two sets, so it only resolves with a set hint.
pub async fn create_test_db() -> SqlitePool {
    let pool = db::init_memory_pool().await.unwrap();
    seed_catalog(&pool).await;
    pool
}

pub async fn seed_catalog(pool: &SqlitePool) {
    let cards = [
        ("ST01-001", "Monkey.D.Luffy", "ST01"),
        ("OP05-119", "Monkey.D.Luffy", "OP05"),
        ("OP01-016", "Nami", "OP01"),
        ("OP01-025", "Roronoa Zoro", "OP01"),
        ("OP01-013", "Sanji", "OP01"),
        ("OP01-004", "Usopp", "OP01"),
        ("OP01-060", "Donquixote Doflamingo", "OP01"),
        ("OP04-031", "Donquixote Doflamingo", "OP04"),
    ];
    for (id, name, set) in cards {
        db::cards::insert_card(pool, id, name, Some(set)).await.unwrap();
    }
}

/// Small page cap, a few workers, no run timeout
pub fn test_params() -> SyncParameters {
    SyncParameters {
        page_cap: 5,
        worker_limit: 3,
        run_timeout_secs: 0,
        ..SyncParameters::default()
    }
}

pub fn create_test_orchestrator(source: Arc<FixtureSource>, pool: &SqlitePool) -> SyncOrchestrator {
    SyncOrchestrator::new(
        source,
        Arc::new(SqliteCardCatalog::new(pool.clone())),
        Arc::new(SqliteGateway::new(pool.clone())),
        test_params(),
    )
}

/// Every persisted deck with its cards, in a stable order
pub async fn snapshot(pool: &SqlitePool) -> Vec<(String, String, Option<String>, Vec<(String, u32)>)> {
    let mut out = Vec::new();
    for tournament in db::tournaments::list_for_source(pool, SOURCE).await.unwrap() {
        let mut decks = db::decks::load_decks_for_tournament(pool, tournament.id).await.unwrap();
        decks.sort_by(|a, b| a.external_player_id.cmp(&b.external_player_id));
        for deck in decks {
            let cards = db::decks::load_deck_cards(pool, deck.id)
                .await
                .unwrap()
                .into_iter()
                .map(|c| (c.card.0, c.quantity))
                .collect();
            out.push((
                tournament.external_id.clone(),
                deck.external_player_id,
                deck.leader.map(|l| l.0),
                cards,
            ));
        }
    }
    out
}

pub async fn tournament_id(pool: &SqlitePool, external_id: &str) -> uuid::Uuid {
    db::tournaments::list_for_source(pool, SOURCE)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.external_id == external_id)
        .map(|t| t.id)
        .unwrap()
}

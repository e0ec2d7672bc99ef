//! Card resolver
//!
//! Maps a [`CardMention`] scraped from a decklist onto a canonical catalog
//! [`CardRef`]. Resolution order, first match wins:
//! 1. normalized name + set/region hint
//! 2. normalized name alone, when it names exactly one card
//!
//! Several distinct candidates are reported as [`ResolutionResult::Ambiguous`],
//! never guessed. A resolver lives for one run; identical raw mentions are
//! answered from its cache without another catalog query.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::models::{CardMention, CardRef};
use crate::types::{CardCatalog, CatalogError};

/// Outcome of resolving one mention
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionResult {
    Resolved(CardRef),
    /// Nothing in the catalog matches; carries the raw name
    Unresolved(String),
    Ambiguous {
        raw_name: String,
        candidates: Vec<CardRef>,
    },
}

impl ResolutionResult {
    pub fn card(&self) -> Option<&CardRef> {
        match self {
            ResolutionResult::Resolved(card) => Some(card),
            _ => None,
        }
    }
}

type CacheKey = (String, Option<String>);

/// Run-scoped resolver over a [`CardCatalog`]
pub struct CardResolver {
    catalog: Arc<dyn CardCatalog>,
    cache: RwLock<HashMap<CacheKey, ResolutionResult>>,
    catalog_queries: AtomicUsize,
}

impl CardResolver {
    pub fn new(catalog: Arc<dyn CardCatalog>) -> Self {
        Self {
            catalog,
            cache: RwLock::new(HashMap::new()),
            catalog_queries: AtomicUsize::new(0),
        }
    }

    /// Resolve one mention; only catalog unavailability is an error
    pub async fn resolve(&self, mention: &CardMention) -> Result<ResolutionResult, CatalogError> {
        let key = mention.cache_key();

        if let Some(cached) = self.cache.read().await.get(&key) {
            tracing::trace!(card = %mention, "Resolution cache hit");
            return Ok(cached.clone());
        }

        let result = self.resolve_uncached(mention).await?;

        // First write wins: a concurrent resolve of the same mention may have
        // landed while the catalog was queried
        let mut cache = self.cache.write().await;
        Ok(cache.entry(key).or_insert(result).clone())
    }

    async fn resolve_uncached(&self, mention: &CardMention) -> Result<ResolutionResult, CatalogError> {
        let name = normalize_card_name(&mention.raw_name);
        if name.is_empty() {
            return Ok(ResolutionResult::Unresolved(mention.raw_name.clone()));
        }

        if let Some(hint) = mention.raw_set_hint.as_deref().and_then(normalize_hint) {
            let mut hits = self.lookup(&name, Some(&hint)).await?;
            match hits.len() {
                0 => {
                    tracing::debug!(card = %mention, hint = %hint, "No match under hint, trying name alone");
                }
                1 => return Ok(ResolutionResult::Resolved(hits.remove(0))),
                _ => {
                    return Ok(ResolutionResult::Ambiguous {
                        raw_name: mention.raw_name.clone(),
                        candidates: hits,
                    })
                }
            }
        }

        let mut hits = self.lookup(&name, None).await?;
        Ok(match hits.len() {
            0 => ResolutionResult::Unresolved(mention.raw_name.clone()),
            1 => ResolutionResult::Resolved(hits.remove(0)),
            _ => ResolutionResult::Ambiguous {
                raw_name: mention.raw_name.clone(),
                candidates: hits,
            },
        })
    }

    /// Catalog lookup with duplicate ids collapsed
    async fn lookup(&self, name: &str, hint: Option<&str>) -> Result<Vec<CardRef>, CatalogError> {
        self.catalog_queries.fetch_add(1, Ordering::Relaxed);
        let mut hits = self.catalog.lookup_card(name, hint).await?;
        hits.sort();
        hits.dedup();
        Ok(hits)
    }

    /// Catalog queries issued so far
    pub fn catalog_queries(&self) -> usize {
        self.catalog_queries.load(Ordering::Relaxed)
    }

    pub async fn cached_mentions(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Lowercase, drop quotes, turn dashes and punctuation into spaces, collapse whitespace
pub fn normalize_card_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars() {
        if is_quote(ch) {
            continue;
        }
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Trimmed, upper-cased, brackets stripped; `None` when nothing is left
pub fn normalize_hint(raw: &str) -> Option<String> {
    let hint: String = raw
        .trim()
        .trim_matches(|c| matches!(c, '(' | ')' | '[' | ']' | '{' | '}'))
        .trim()
        .to_uppercase();
    (!hint.is_empty()).then_some(hint)
}

fn is_quote(ch: char) -> bool {
    matches!(
        ch,
        '\'' | '"' | '`' | '\u{00B4}' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}'
            | '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2032}'
    )
}

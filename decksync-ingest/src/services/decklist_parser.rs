//! Decklist parser
//!
//! A tournament detail page holds one `.deck` block per player:
//! ```html
//! <article class="deck" data-player-id="p-17">
//!   <span class="player">Alice</span>
//!   <span class="placement">1st</span>
//!   <div class="leader" data-set="OP01">Monkey.D.Luffy</div>
//!   <ul class="cards">
//!     <li class="card" data-set="OP01"><span class="qty">4</span> <span class="name">Nami</span></li>
//!     <li class="card">2x Roronoa Zoro (OP01)</li>
//!   </ul>
//! </article>
//! ```
//! A deck without any player identity is skipped. A deck without card lines
//! is kept with a warning. A card line without a usable quantity or name is
//! skipped; quantities are never guessed. Quantities above
//! [`MAX_CARD_QUANTITY`] are rejected as unusable.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::parsing::{attr, child_text, element_text, selector, ParseIssue};
use crate::models::{CardMention, RawDocument};
use crate::utils::text::{first_number, normalize_ws, slugify};

/// Largest copy count accepted on one card line
pub const MAX_CARD_QUANTITY: u32 = 99;

static DECK: Lazy<Selector> = Lazy::new(|| selector(".deck"));
static PLAYER: Lazy<Selector> = Lazy::new(|| selector(".player"));
static PLACEMENT: Lazy<Selector> = Lazy::new(|| selector(".placement"));
static LEADER: Lazy<Selector> = Lazy::new(|| selector(".leader"));
static CARD_LINE: Lazy<Selector> = Lazy::new(|| selector("li.card, .cards li"));
static QTY: Lazy<Selector> = Lazy::new(|| selector(".qty, .quantity"));
static CARD_NAME: Lazy<Selector> = Lazy::new(|| selector(".name, .card-name"));
static SET: Lazy<Selector> = Lazy::new(|| selector(".set"));

/// One player's decklist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDeck {
    pub external_player_id: String,
    pub player: String,
    pub placement: Option<u32>,
    pub leader: Option<CardMention>,
    pub cards: Vec<CardMention>,
    /// Warnings and skipped lines of this deck
    pub issues: Vec<ParseIssue>,
}

/// Every deck of one tournament page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecklistPage {
    pub decks: Vec<ParsedDeck>,
    /// Skipped decks and page-level warnings
    pub issues: Vec<ParseIssue>,
}

/// Parse all `.deck` blocks of a tournament detail page
pub fn parse_decklists(doc: &RawDocument) -> DecklistPage {
    let html = Html::parse_document(&doc.body);
    let mut page = DecklistPage::default();

    for (index, deck) in html.select(&DECK).enumerate() {
        let context = format!("{} deck {}", doc.url, index + 1);
        match parse_decklist(&deck, &context) {
            Ok(parsed) => page.decks.push(parsed),
            Err(issue) => page.issues.push(issue),
        }
    }

    if page.decks.is_empty() && page.issues.is_empty() {
        page.issues.push(ParseIssue::warning(
            doc.url.clone(),
            "tournament page contains no decklists",
        ));
    }

    tracing::debug!(
        url = %doc.url,
        decks = page.decks.len(),
        skipped = page.issues.iter().filter(|i| i.is_error()).count(),
        "Parsed decklist page"
    );

    page
}

/// Parse one `.deck` block
pub fn parse_decklist(deck: &ElementRef<'_>, context: &str) -> Result<ParsedDeck, ParseIssue> {
    let player = child_text(deck, &PLAYER);
    let external_player_id = attr(deck, "data-player-id")
        .or_else(|| player.as_deref().map(slugify).filter(|slug| !slug.is_empty()))
        .ok_or_else(|| ParseIssue::error(context, "deck has no player identity, skipped"))?;

    let deck_context = format!("{} ({})", context, external_player_id);
    let mut issues = Vec::new();

    let placement = child_text(deck, &PLACEMENT).and_then(|p| first_number(&p));

    let leader = deck.select(&LEADER).next().and_then(|el| {
        let name = child_text(&el, &CARD_NAME).unwrap_or_else(|| element_text(&el));
        (!name.is_empty()).then(|| CardMention::new(name, attr(&el, "data-set"), 1))
    });
    if leader.is_none() {
        issues.push(ParseIssue::warning(deck_context.clone(), "deck lists no leader"));
    }

    let mut cards = Vec::new();
    for (line_index, line) in deck.select(&CARD_LINE).enumerate() {
        match parse_card_line(&line) {
            Ok(mention) => cards.push(mention),
            Err(message) => issues.push(ParseIssue::error(
                format!("{} line {}", deck_context, line_index + 1),
                message,
            )),
        }
    }

    if cards.is_empty() {
        issues.push(ParseIssue::warning(deck_context, "decklist has no card lines"));
    }

    Ok(ParsedDeck {
        player: player.unwrap_or_else(|| external_player_id.clone()),
        external_player_id,
        placement,
        leader,
        cards,
        issues,
    })
}

/// Structured line (`.qty` + `.name`) or free text (`4x Name (SET)`)
fn parse_card_line(line: &ElementRef<'_>) -> Result<CardMention, String> {
    let hint = attr(line, "data-set").or_else(|| child_text(line, &SET));

    if let Some(qty_text) = child_text(line, &QTY) {
        let quantity = first_number(&qty_text)
            .filter(|q| (1..=MAX_CARD_QUANTITY).contains(q))
            .ok_or_else(|| format!("card line has unusable quantity '{}'", qty_text))?;
        let name = child_text(line, &CARD_NAME)
            .ok_or_else(|| "card line has a quantity but no name".to_string())?;
        return Ok(CardMention::new(name, hint, quantity));
    }

    let (quantity, name, text_hint) = parse_text_line(&element_text(line))?;
    Ok(CardMention::new(name, hint.or(text_hint), quantity))
}

/// `"4x Nami (OP01)"` → `(4, "Nami", Some("OP01"))`
pub fn parse_text_line(text: &str) -> Result<(u32, String, Option<String>), String> {
    let text = text.trim();
    let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
    let quantity: u32 = match digits.parse::<u64>() {
        Ok(q) if q > u64::from(MAX_CARD_QUANTITY) => {
            return Err(format!(
                "card line '{}' has quantity above {}",
                text, MAX_CARD_QUANTITY
            ))
        }
        Ok(q) if q > 0 => q as u32,
        _ => return Err(format!("card line '{}' has no quantity", text)),
    };

    let mut rest = text[digits.len()..].trim_start();
    if let Some(after_x) = rest.strip_prefix(['x', 'X', '×']) {
        if after_x.is_empty() || after_x.starts_with(char::is_whitespace) {
            rest = after_x.trim_start();
        }
    }

    let (name, hint) = match (rest.rfind('('), rest.ends_with(')')) {
        (Some(open), true) => {
            let hint = normalize_ws(&rest[open + 1..rest.len() - 1]);
            (normalize_ws(&rest[..open]), (!hint.is_empty()).then_some(hint))
        }
        _ => (normalize_ws(rest), None),
    };

    if name.is_empty() {
        return Err(format!("card line '{}' has no card name", text));
    }
    Ok((quantity, name, hint))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> RawDocument {
        RawDocument::new("http://source/tournaments/T1/decklists", body)
    }

    #[test]
    fn test_structured_and_text_lines() {
        let page = parse_decklists(&doc(
            r#"<section>
              <article class="deck" data-player-id="p-17">
                <span class="player">Alice</span>
                <span class="placement">1st</span>
                <div class="leader" data-set="OP01">Monkey.D.Luffy</div>
                <ul class="cards">
                  <li class="card" data-set="OP01"><span class="qty">4</span> <span class="name">Nami</span></li>
                  <li class="card">2x Roronoa Zoro (OP01)</li>
                  <li class="card">1 Usopp</li>
                </ul>
              </article>
            </section>"#,
        ));

        assert!(page.issues.is_empty());
        assert_eq!(page.decks.len(), 1);
        let deck = &page.decks[0];
        assert_eq!(deck.external_player_id, "p-17");
        assert_eq!(deck.player, "Alice");
        assert_eq!(deck.placement, Some(1));
        assert_eq!(
            deck.leader,
            Some(CardMention::new("Monkey.D.Luffy", Some("OP01".to_string()), 1))
        );
        assert_eq!(
            deck.cards,
            vec![
                CardMention::new("Nami", Some("OP01".to_string()), 4),
                CardMention::new("Roronoa Zoro", Some("OP01".to_string()), 2),
                CardMention::new("Usopp", None, 1),
            ]
        );
        assert!(deck.issues.is_empty());
    }

    #[test]
    fn test_deck_without_identity_is_skipped() {
        let page = parse_decklists(&doc(
            r#"<div class="deck"><ul class="cards"><li class="card">4 Nami</li></ul></div>
               <div class="deck"><span class="player">Bob Smith</span>
                 <ul class="cards"><li class="card">4 Nami</li></ul></div>"#,
        ));

        assert_eq!(page.decks.len(), 1);
        assert_eq!(page.decks[0].external_player_id, "bob-smith");
        assert_eq!(page.issues.len(), 1);
        assert!(page.issues[0].is_error());
        assert!(page.issues[0].context.ends_with("deck 1"));
    }

    #[test]
    fn test_empty_decklist_is_warning_only() {
        let page = parse_decklists(&doc(
            r#"<div class="deck" data-player-id="p-1"><span class="player">Cara</span>
               <div class="leader">Trafalgar Law</div></div>"#,
        ));

        assert_eq!(page.decks.len(), 1);
        let deck = &page.decks[0];
        assert!(deck.cards.is_empty());
        assert_eq!(deck.issues.len(), 1);
        assert!(!deck.issues[0].is_error());
    }

    #[test]
    fn test_bad_line_skipped_without_inventing_quantity() {
        let page = parse_decklists(&doc(
            r#"<div class="deck" data-player-id="p-2"><div class="leader">Law</div>
               <ul class="cards">
                 <li class="card"><span class="qty">x</span><span class="name">Nami</span></li>
                 <li class="card">Zoro</li>
                 <li class="card">3 Sanji</li>
               </ul></div>"#,
        ));

        let deck = &page.decks[0];
        assert_eq!(deck.cards, vec![CardMention::new("Sanji", None, 3)]);
        let errors: Vec<_> = deck.issues.iter().filter(|i| i.is_error()).collect();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].context.ends_with("line 1"));
    }

    #[test]
    fn test_parse_text_line_variants() {
        assert_eq!(
            parse_text_line("4x Nami (OP01)").unwrap(),
            (4, "Nami".to_string(), Some("OP01".to_string()))
        );
        assert_eq!(
            parse_text_line("2 Xanadu").unwrap(),
            (2, "Xanadu".to_string(), None)
        );
        assert!(parse_text_line("0 Nami").is_err());
        assert!(parse_text_line("4x").is_err());
    }

    #[test]
    fn test_oversized_quantities_rejected() {
        assert_eq!(parse_text_line("99x Nami").unwrap().0, MAX_CARD_QUANTITY);
        assert!(parse_text_line("100x Nami").is_err());
        assert!(parse_text_line("4000000000x Nami (OP01)").is_err());
        assert!(parse_text_line("99999999999999999999999 Nami").is_err());

        let page = parse_decklists(&doc(
            r#"<div class="deck" data-player-id="p-3"><div class="leader">Law</div>
               <ul class="cards">
                 <li class="card"><span class="qty">4000000000</span><span class="name">Nami</span></li>
                 <li class="card">4000000000x Nami (OP01)</li>
                 <li class="card">2 Sanji</li>
               </ul></div>"#,
        ));

        let deck = &page.decks[0];
        assert_eq!(deck.cards, vec![CardMention::new("Sanji", None, 2)]);
        assert_eq!(deck.issues.iter().filter(|i| i.is_error()).count(), 2);
    }

    #[test]
    fn test_page_without_decks_warns() {
        let page = parse_decklists(&doc("<p>No decklists published</p>"));
        assert!(page.decks.is_empty());
        assert_eq!(page.issues.len(), 1);
        assert!(!page.issues[0].is_error());
    }
}

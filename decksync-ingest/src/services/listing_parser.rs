//! Tournament listing parser
//!
//! Turns a listing page into [`TournamentStub`]s. Rows with a missing or
//! unusable mandatory field (external id, name, date) are excluded and
//! reported; the rest of the page is unaffected. Location is optional.
//!
//! Expected row shape:
//! ```html
//! <tr class="tournament" data-tournament-id="T1">
//!   <td class="name"><a href="/tournaments/T1/standings">Regional Berlin</a></td>
//!   <td class="date"><time datetime="2024-03-02">2 March 2024</time></td>
//!   <td class="location">Berlin, DE</td>
//! </tr>
//! ```

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::parsing::{attr, child_text, element_text, selector, ParseIssue};
use crate::models::{RawDocument, TournamentStub};

static ROW: Lazy<Selector> = Lazy::new(|| selector("tr.tournament, li.tournament, article.tournament, [data-tournament-id]"));
static NAME: Lazy<Selector> = Lazy::new(|| selector(".name"));
static NAME_LINK: Lazy<Selector> = Lazy::new(|| selector(".name a[href], a.standings[href]"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static DATE: Lazy<Selector> = Lazy::new(|| selector(".date"));
static TIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static LOCATION: Lazy<Selector> = Lazy::new(|| selector(".location"));
static NEXT: Lazy<Selector> = Lazy::new(|| selector("a.next, link[rel=next], a[rel=next]"));

/// Accepted human date layouts, tried in order
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d %B %Y", "%d %b %Y", "%B %d, %Y", "%b %d, %Y", "%d/%m/%Y"];

/// Result of parsing one listing page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    stubs: Vec<TournamentStub>,
    pub issues: Vec<ParseIssue>,
}

impl ListingPage {
    /// Stubs in document order; call again to restart
    pub fn stubs(&self) -> std::slice::Iter<'_, TournamentStub> {
        self.stubs.iter()
    }

    pub fn into_stubs(self) -> Vec<TournamentStub> {
        self.stubs
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

/// Parse every tournament row of a listing page
pub fn parse_listing(doc: &RawDocument) -> ListingPage {
    let html = Html::parse_document(&doc.body);
    let mut page = ListingPage::default();

    for (index, row) in html.select(&ROW).enumerate() {
        let context = format!("{} row {}", doc.url, index + 1);
        match parse_row(&row) {
            Ok(stub) => page.stubs.push(stub),
            Err(message) => page.issues.push(ParseIssue::error(context, message)),
        }
    }

    if page.stubs.is_empty() && page.issues.is_empty() {
        page.issues.push(ParseIssue::warning(
            doc.url.clone(),
            "listing page contains no tournament rows",
        ));
    }

    tracing::debug!(
        url = %doc.url,
        stubs = page.stubs.len(),
        issues = page.issues.len(),
        "Parsed listing page"
    );

    page
}

/// True when the page links to a further listing page
pub fn has_next_page(doc: &RawDocument) -> bool {
    let html = Html::parse_document(&doc.body);
    let found = html.select(&NEXT).any(|link| {
        let disabled = link
            .value()
            .attr("class")
            .is_some_and(|c| c.split_whitespace().any(|class| class == "disabled"));
        let href = link.value().attr("href").map(str::trim).unwrap_or("");
        !disabled && !href.is_empty() && href != "#"
    });
    found
}

fn parse_row(row: &ElementRef<'_>) -> Result<TournamentStub, String> {
    let standings_url = row
        .select(&NAME_LINK)
        .next()
        .and_then(|a| attr(&a, "href"));

    let external_id = attr(row, "data-tournament-id")
        .or_else(|| {
            row.select(&ANY_LINK)
                .filter_map(|a| a.value().attr("href").and_then(id_from_href))
                .next()
        })
        .ok_or_else(|| "missing external id".to_string())?;

    let name = child_text(row, &NAME)
        .ok_or_else(|| format!("tournament {}: missing name", external_id))?;

    let raw_date = row
        .select(&TIME)
        .next()
        .and_then(|t| attr(&t, "datetime"))
        .or_else(|| child_text(row, &DATE))
        .ok_or_else(|| format!("tournament {}: missing date", external_id))?;

    let date = parse_date(&raw_date)
        .ok_or_else(|| format!("tournament {}: unrecognized date '{}'", external_id, raw_date))?;

    let location = row
        .select(&LOCATION)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default();

    Ok(TournamentStub {
        external_id,
        name,
        date,
        location,
        standings_url,
    })
}

/// Id segment of `/tournaments/{id}/...`
fn id_from_href(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next()?;
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments.find(|s| *s == "tournaments")?;
    segments.next().map(str::to_string)
}

/// Parse a listing date; ISO timestamps keep only their date part
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Some(prefix) = trimmed.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

//! Shared pieces of the HTML parsers

use scraper::{ElementRef, Selector};

use crate::utils::text::normalize_ws;

/// Whether a parse problem dropped something
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseSeverity {
    /// Recorded, nothing dropped
    Warning,
    /// The item (row, deck, card line) was excluded
    Error,
}

/// Problem found while parsing one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIssue {
    pub severity: ParseSeverity,
    /// Where in the document: URL plus row/deck/line
    pub context: String,
    pub message: String,
}

impl ParseIssue {
    pub fn warning(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ParseSeverity::Warning,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn error(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ParseSeverity::Error,
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == ParseSeverity::Error
    }
}

/// Compile a selector known at build time
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e:?}"))
}

/// Whitespace-normalized text of the first match of `sel` under `el`
pub(crate) fn child_text(el: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    el.select(sel)
        .next()
        .map(|child| element_text(&child))
        .filter(|text| !text.is_empty())
}

/// Whitespace-normalized text content of `el`
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// Trimmed, non-empty attribute value
pub(crate) fn attr(el: &ElementRef<'_>, name: &str) -> Option<String> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

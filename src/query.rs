//! Query resolution
//!
//! Turns raw CLI input into a `Query` whose symbol is a valid lookup key:
//! - Explicit symbol: validated and upper-cased
//! - Cashtag in the question (`$AAPL`): wins over anything else
//! - Bare all-caps ticker in the question (`MSFT`, `BRK.B`)
//!
//! Runs before any network I/O, so an unusable query costs nothing.

use crate::error::AgentError;
use crate::models::{DataKind, Query};
use crate::Result;

pub const DEFAULT_PERIODS: u8 = 3;
pub const MAX_PERIODS: u8 = 10;
const MAX_SYMBOL_LEN: usize = 10;

/// All-caps words that show up in finance questions but are not tickers
const NON_TICKER_WORDS: &[&str] = &[
    // English
    "I", "A", "AN", "AND", "OR", "THE", "IS", "IT", "OF", "TO", "IN", "ON", "AT", "FOR",
    "VS", "OK", "BUY", "SELL", "HOLD", "NOW",
    // Roles & bodies
    "CEO", "CFO", "CTO", "COO", "SEC", "FED", "FOMC", "IRS",
    // Metrics
    "EPS", "PE", "ROE", "ROI", "ROA", "EBIT", "DCF", "TTM", "YOY", "QOQ", "GDP", "CPI",
    "ATH", "EOD", "ESG", "FCF", "NAV", "AUM", "IPO",
    // Places, currencies, venues
    "US", "USA", "UK", "EU", "USD", "EUR", "GBP", "JPY", "NYSE", "ETF",
    // Periods
    "Q1", "Q2", "Q3", "Q4", "FY", "H1", "H2",
    // Tech
    "AI", "API", "FMP", "LLM",
];

pub struct QueryResolver;

impl QueryResolver {
    /// Build a validated query from an optional explicit symbol and free text
    pub fn resolve(
        symbol: Option<&str>,
        question: &str,
        data_kind: DataKind,
        periods: u8,
    ) -> Result<Query> {
        if periods == 0 || periods > MAX_PERIODS {
            return Err(AgentError::InvalidQuery(format!(
                "periods must be between 1 and {}, got {}",
                MAX_PERIODS, periods
            )));
        }

        let question = question.trim();

        let (symbol, question) = match symbol.map(str::trim).filter(|s| !s.is_empty()) {
            Some(explicit) => (normalize_symbol(explicit)?, question.to_string()),
            None if is_single_token(question) => (single_token_symbol(question)?, String::new()),
            None => {
                let found = extract_symbol(question).ok_or_else(|| {
                    AgentError::InvalidQuery(if question.is_empty() {
                        "Provide a ticker symbol (--symbol AAPL) or a question naming one"
                            .to_string()
                    } else {
                        format!(
                            "No ticker symbol found in '{}'. Use a cashtag like $AAPL or pass --symbol",
                            question
                        )
                    })
                })?;
                (found, question.to_string())
            }
        };

        let question = if question.is_empty() {
            default_question(&symbol, data_kind)
        } else {
            question
        };

        Ok(Query {
            symbol,
            question,
            data_kind,
            periods,
        })
    }
}

fn default_question(symbol: &str, data_kind: DataKind) -> String {
    match data_kind {
        DataKind::Quote => format!(
            "Give a concise analysis of {}'s current trading position based on the quote data.",
            symbol
        ),
        DataKind::Profile => format!(
            "Summarize {}'s business, sector positioning and key risks based on the company profile.",
            symbol
        ),
        DataKind::IncomeStatement => format!(
            "Analyze {}'s revenue, margin and earnings trends based on the income statements.",
            symbol
        ),
    }
}

fn is_single_token(text: &str) -> bool {
    !text.is_empty() && !text.contains(char::is_whitespace)
}

/// A bare word is only taken as a ticker when it could be one; a cashtag is trusted
fn single_token_symbol(token: &str) -> Result<String> {
    let token = clean_token(token);

    if token.starts_with('$') {
        return normalize_symbol(token);
    }

    let upper = token.to_uppercase();
    if looks_like_ticker(&upper) {
        return Ok(upper);
    }

    Err(AgentError::InvalidQuery(format!(
        "'{}' does not look like a ticker symbol. Use a cashtag like $AAPL or pass --symbol",
        token
    )))
}

/// Validate and canonicalize a ticker symbol
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let symbol = raw.trim().trim_start_matches('$').to_uppercase();

    let valid_chars = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^'));

    if symbol.is_empty()
        || symbol.len() > MAX_SYMBOL_LEN
        || !valid_chars
        || !symbol.chars().any(|c| c.is_ascii_alphabetic())
    {
        return Err(AgentError::InvalidQuery(format!(
            "'{}' is not a valid ticker symbol",
            raw.trim()
        )));
    }

    Ok(symbol)
}

/// Find the ticker a free-text question refers to
pub fn extract_symbol(text: &str) -> Option<String> {
    let tokens: Vec<&str> = text.split_whitespace().map(clean_token).collect();

    let cashtag = tokens
        .iter()
        .filter_map(|t| t.strip_prefix('$'))
        .find_map(|t| normalize_symbol(t).ok());

    if cashtag.is_some() {
        return cashtag;
    }

    tokens
        .iter()
        .find(|t| looks_like_ticker(t))
        .map(|t| t.to_string())
}

/// Strip punctuation around a word and a trailing possessive
fn clean_token(token: &str) -> &str {
    let trimmed = token.trim_matches(|c: char| !(c.is_ascii_alphanumeric() || c == '$' || c == '^'));

    ["'s", "'S", "\u{2019}s", "\u{2019}S"]
        .iter()
        .find_map(|suffix| trimmed.strip_suffix(*suffix))
        .unwrap_or(trimmed)
}

fn looks_like_ticker(token: &str) -> bool {
    let body = token.strip_prefix('^').unwrap_or(token);

    let (root, class) = match body.find(|c: char| c == '.' || c == '-') {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let all_caps = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_uppercase());

    let root_ok = all_caps(root) && root.len() <= 5;
    let class_ok = class.map_or(true, |c| all_caps(c) && c.len() <= 2);

    // U.S, U.K
    let abbreviation = root.len() == 1 && class.map_or(false, |c| c.len() == 1);

    root_ok && class_ok && !abbreviation && !NON_TICKER_WORDS.contains(&root)
}

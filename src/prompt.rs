//! Prompt construction
//!
//! Combines the fetched market data and the user's question into the
//! system instruction + user prompt pair sent to the model.

use crate::models::{CompanyProfile, IncomeStatement, MarketData, MarketSnapshot, Query, Quote};
use sha2::{Digest, Sha256};
use std::fmt::Write;

const MAX_DESCRIPTION_CHARS: usize = 600;

const SYSTEM_INSTRUCTION: &str = r#"You are a professional equity research analyst.

Guidelines:
- Base every figure you cite on the market data provided; do not invent numbers
- Say so plainly when the data is insufficient to answer
- Be structured and concise
- Point out both opportunities and risks
- Use professional financial language

The data may be delayed. End with a one-line reminder that this is not investment advice."#;

/// A ready-to-send prompt
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system_instruction: String,
    pub text: String,
}

impl Prompt {
    /// SHA256 of exactly what is sent to the model
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.system_instruction.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub fn build_prompt(query: &Query, snapshot: &MarketSnapshot) -> Prompt {
    let mut text = String::new();

    let _ = writeln!(
        text,
        "Market data for {} (source: Financial Modeling Prep, retrieved {}):",
        snapshot.symbol,
        snapshot.fetched_at.format("%Y-%m-%d %H:%M UTC")
    );
    text.push('\n');

    match &snapshot.data {
        MarketData::Quote(quote) => write_quote(&mut text, quote),
        MarketData::Profile(profile) => write_profile(&mut text, profile),
        MarketData::IncomeStatements(statements) => write_statements(&mut text, statements),
    }

    text.push_str("\n---\n\n");
    text.push_str("Question: ");
    text.push_str(query.question.trim());
    text.push('\n');

    Prompt {
        system_instruction: SYSTEM_INSTRUCTION.to_string(),
        text,
    }
}

fn write_quote(out: &mut String, q: &Quote) {
    field(out, "Name", q.name.clone());
    field(out, "Exchange", q.exchange.clone());
    field(out, "Price", q.price.map(price));
    field(
        out,
        "Change",
        q.change.map(|c| match q.changes_percentage {
            Some(pct) => format!("{:+.2} ({:+.2}%)", c, pct),
            None => format!("{:+.2}", c),
        }),
    );
    field(out, "Open", q.open.map(price));
    field(out, "Previous close", q.previous_close.map(price));
    field(out, "Day range", range(q.day_low, q.day_high));
    field(out, "52-week range", range(q.year_low, q.year_high));
    field(out, "50-day average", q.price_avg50.map(price));
    field(out, "200-day average", q.price_avg200.map(price));
    field(out, "Volume", q.volume.map(humanize));
    field(out, "Average volume", q.avg_volume.map(humanize));
    field(out, "Market cap", q.market_cap.map(humanize));
    field(out, "EPS", q.eps.map(price));
    field(out, "P/E", q.pe.map(|v| format!("{:.2}", v)));
    field(out, "Shares outstanding", q.shares_outstanding.map(humanize));
    field(out, "Next earnings", q.earnings_announcement.clone());
}

fn write_profile(out: &mut String, p: &CompanyProfile) {
    field(out, "Company", p.company_name.clone());
    field(out, "Exchange", p.exchange_short_name.clone());
    field(out, "Sector", p.sector.clone());
    field(out, "Industry", p.industry.clone());
    field(out, "Country", p.country.clone());
    field(out, "CEO", p.ceo.clone());
    field(out, "Employees", p.full_time_employees.clone());
    field(out, "IPO date", p.ipo_date.clone());
    field(out, "Currency", p.currency.clone());
    field(out, "Price", p.price.map(price));
    field(out, "52-week range", p.range.clone());
    field(out, "Market cap", p.mkt_cap.map(humanize));
    field(out, "Beta", p.beta.map(|v| format!("{:.2}", v)));
    field(out, "Last dividend", p.last_div.map(price));
    field(out, "Average volume", p.vol_avg.map(humanize));
    field(out, "DCF value", p.dcf.map(price));
    field(out, "ETF", p.is_etf.map(|b| (if b { "yes" } else { "no" }).to_string()));
    field(
        out,
        "Description",
        p.description.as_deref().map(|d| truncate_chars(d.trim(), MAX_DESCRIPTION_CHARS)),
    );
}

fn write_statements(out: &mut String, statements: &[IncomeStatement]) {
    for (i, s) in statements.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }

        let label = match (&s.calendar_year, &s.period) {
            (Some(year), Some(period)) => format!("{} {}", period, year),
            (Some(year), None) => year.clone(),
            _ => s.date.clone().unwrap_or_else(|| format!("Period {}", i + 1)),
        };
        let _ = writeln!(
            out,
            "{}{}:",
            label,
            s.reported_currency
                .as_deref()
                .map(|c| format!(" ({})", c))
                .unwrap_or_default()
        );

        field(out, "  Revenue", s.revenue.map(humanize));
        field(out, "  Cost of revenue", s.cost_of_revenue.map(humanize));
        field(out, "  Gross profit", s.gross_profit.map(humanize));
        field(out, "  Gross margin", margin(s.gross_profit_ratio, s.gross_profit, s.revenue));
        field(out, "  R&D expenses", s.research_and_development_expenses.map(humanize));
        field(out, "  Operating expenses", s.operating_expenses.map(humanize));
        field(out, "  Operating income", s.operating_income.map(humanize));
        field(
            out,
            "  Operating margin",
            margin(s.operating_income_ratio, s.operating_income, s.revenue),
        );
        field(out, "  EBITDA", s.ebitda.map(humanize));
        field(out, "  Net income", s.net_income.map(humanize));
        field(out, "  Net margin", margin(s.net_income_ratio, s.net_income, s.revenue));
        field(out, "  EPS", s.eps.map(price));
        field(out, "  Diluted EPS", s.eps_diluted.map(price));
    }
}

fn field(out: &mut String, label: &str, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        let _ = writeln!(out, "{}: {}", label, value);
    }
}

fn price(v: f64) -> String {
    format!("{:.2}", v)
}

fn range(low: Option<f64>, high: Option<f64>) -> Option<String> {
    Some(format!("{:.2} - {:.2}", low?, high?))
}

/// Ratio as reported, else derived from the line item and revenue
fn margin(ratio: Option<f64>, value: Option<f64>, revenue: Option<f64>) -> Option<String> {
    let ratio = ratio.or_else(|| match (value, revenue) {
        (Some(v), Some(r)) if r != 0.0 => Some(v / r),
        _ => None,
    })?;
    Some(format!("{:.1}%", ratio * 100.0))
}

/// Compact large numbers: 2.95T, 512.30M, 1.20K
pub fn humanize(value: f64) -> String {
    let abs = value.abs();
    let (scaled, suffix) = if abs >= 1e12 {
        (value / 1e12, "T")
    } else if abs >= 1e9 {
        (value / 1e9, "B")
    } else if abs >= 1e6 {
        (value / 1e6, "M")
    } else if abs >= 1e3 {
        (value / 1e3, "K")
    } else {
        return format!("{:.2}", value);
    };
    format!("{:.2}{}", scaled, suffix)
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataKind;
    use chrono::Utc;

    fn query(question: &str, data_kind: DataKind) -> Query {
        Query {
            symbol: "AAPL".to_string(),
            question: question.to_string(),
            data_kind,
            periods: 3,
        }
    }

    fn snapshot(data: MarketData) -> MarketSnapshot {
        MarketSnapshot {
            symbol: "AAPL".to_string(),
            fetched_at: Utc::now(),
            data,
        }
    }

    #[test]
    fn test_quote_prompt() {
        let quote = Quote {
            symbol: "AAPL".to_string(),
            name: Some("Apple Inc.".to_string()),
            price: Some(189.84),
            change: Some(1.42),
            changes_percentage: Some(0.7536),
            market_cap: Some(2.936e12),
            day_low: Some(187.61),
            day_high: Some(190.32),
            ..Quote::default()
        };

        let prompt = build_prompt(
            &query("Is Apple overvalued?", DataKind::Quote),
            &snapshot(MarketData::Quote(quote)),
        );

        assert!(prompt.text.contains("Market data for AAPL"));
        assert!(prompt.text.contains("Price: 189.84"));
        assert!(prompt.text.contains("Change: +1.42 (+0.75%)"));
        assert!(prompt.text.contains("Market cap: 2.94T"));
        assert!(prompt.text.contains("Day range: 187.61 - 190.32"));
        assert!(prompt.text.ends_with("Question: Is Apple overvalued?\n"));
        // absent fields are omitted rather than printed empty
        assert!(!prompt.text.contains("P/E"));
        assert!(prompt.system_instruction.contains("not investment advice"));
    }

    #[test]
    fn test_profile_description_truncated() {
        let profile = CompanyProfile {
            symbol: "AAPL".to_string(),
            company_name: Some("Apple Inc.".to_string()),
            sector: Some("Technology".to_string()),
            description: Some("é".repeat(1000)),
            ..CompanyProfile::default()
        };

        let prompt = build_prompt(
            &query("Summarize", DataKind::Profile),
            &snapshot(MarketData::Profile(profile)),
        );

        assert!(prompt.text.contains("Sector: Technology"));
        let description = prompt
            .text
            .lines()
            .find(|l| l.starts_with("Description: "))
            .unwrap();
        assert_eq!(description.chars().count(), "Description: ".len() + 600 + 3);
    }

    #[test]
    fn test_statement_margins_derived() {
        let statements = vec![IncomeStatement {
            symbol: "AAPL".to_string(),
            calendar_year: Some("2023".to_string()),
            period: Some("FY".to_string()),
            reported_currency: Some("USD".to_string()),
            revenue: Some(383.286e9),
            net_income: Some(96.995e9),
            ..IncomeStatement::default()
        }];

        let prompt = build_prompt(
            &query("Trend?", DataKind::IncomeStatement),
            &snapshot(MarketData::IncomeStatements(statements)),
        );

        assert!(prompt.text.contains("FY 2023 (USD):"));
        assert!(prompt.text.contains("  Revenue: 383.29B"));
        assert!(prompt.text.contains("  Net margin: 25.3%"));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let q = query("Same question", DataKind::Quote);
        let s = snapshot(MarketData::Quote(Quote {
            symbol: "AAPL".to_string(),
            ..Quote::default()
        }));

        let a = build_prompt(&q, &s);
        let b = build_prompt(&q, &s);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        let c = build_prompt(&query("Other question", DataKind::Quote), &s);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(2.936e12), "2.94T");
        assert_eq!(humanize(512_300_000.0), "512.30M");
        assert_eq!(humanize(-1_500.0), "-1.50K");
        assert_eq!(humanize(42.0), "42.00");
    }
}

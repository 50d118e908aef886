//! Terminal rendering of a finished run

use crate::models::{AnalysisResult, MarketData};
use crate::prompt::humanize;
use crate::Result;

/// How the result is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn render(result: &AnalysisResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Text => Ok(render_text(result)),
    }
}

fn render_text(result: &AnalysisResult) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {} ===\n", header(result)));
    out.push('\n');
    out.push_str(result.analysis.trim_end());
    out.push('\n');

    if result.finish_reason.as_deref() == Some("MAX_TOKENS") {
        out.push_str("\n[analysis truncated at the model's output limit]\n");
    }

    out
}

/// One line: symbol, headline figure, model
fn header(result: &AnalysisResult) -> String {
    let headline = match &result.snapshot.data {
        MarketData::Quote(q) => match (q.price, q.changes_percentage) {
            (Some(p), Some(pct)) => Some(format!("{:.2} ({:+.2}%)", p, pct)),
            (Some(p), None) => Some(format!("{:.2}", p)),
            _ => None,
        },
        MarketData::Profile(p) => p
            .company_name
            .clone()
            .or_else(|| p.mkt_cap.map(|c| format!("market cap {}", humanize(c)))),
        MarketData::IncomeStatements(statements) => statements
            .first()
            .and_then(|s| s.revenue.map(|r| (s.calendar_year.clone(), r)))
            .map(|(year, revenue)| match year {
                Some(year) => format!("revenue {} ({})", humanize(revenue), year),
                None => format!("revenue {}", humanize(revenue)),
            }),
    };

    match headline {
        Some(h) => format!("{} · {} · {}", result.query.symbol, h, result.model),
        None => format!("{} · {}", result.query.symbol, result.model),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DataKind, MarketSnapshot, Query, Quote};
    use chrono::Utc;
    use uuid::Uuid;

    fn result(finish_reason: Option<&str>) -> AnalysisResult {
        AnalysisResult {
            run_id: Uuid::new_v4(),
            query: Query {
                symbol: "AAPL".to_string(),
                question: "How is Apple doing?".to_string(),
                data_kind: DataKind::Quote,
                periods: 3,
            },
            snapshot: MarketSnapshot {
                symbol: "AAPL".to_string(),
                fetched_at: Utc::now(),
                data: MarketData::Quote(Quote {
                    symbol: "AAPL".to_string(),
                    price: Some(189.84),
                    changes_percentage: Some(0.75),
                    ..Quote::default()
                }),
            },
            analysis: "Apple looks steady.\n".to_string(),
            model: "gemini-2.0-flash".to_string(),
            finish_reason: finish_reason.map(str::to_string),
            usage: None,
            prompt_fingerprint: "ab".repeat(32),
            trace: vec!["START: AAPL (quote)".to_string()],
            generated_at: Utc::now(),
            elapsed_ms: 42,
        }
    }

    #[test]
    fn test_text_output() {
        let text = render(&result(Some("STOP")), OutputFormat::Text).unwrap();
        assert!(text.starts_with("=== AAPL · 189.84 (+0.75%) · gemini-2.0-flash ==="));
        assert!(text.contains("Apple looks steady."));
        assert!(!text.contains("truncated"));
    }

    #[test]
    fn test_truncation_notice() {
        let text = render(&result(Some("MAX_TOKENS")), OutputFormat::Text).unwrap();
        assert!(text.contains("truncated"));
    }

    #[test]
    fn test_json_output() {
        let json = render(&result(None), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["query"]["symbol"], "AAPL");
        assert_eq!(value["snapshot"]["data"]["kind"], "quote");
        assert_eq!(value["analysis"], "Apple looks steady.\n");
    }
}

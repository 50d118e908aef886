//! Core data models for the market analyst agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Query =================
//

/// Which single Financial Modeling Prep endpoint a run reads from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    #[default]
    Quote,
    Profile,
    IncomeStatement,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub symbol: String,
    pub question: String,
    pub data_kind: DataKind,
    /// Number of annual statements requested for `DataKind::IncomeStatement`
    pub periods: u8,
}

//
// ================= Market Data =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub fetched_at: DateTime<Utc>,
    pub data: MarketData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "records", rename_all = "snake_case")]
pub enum MarketData {
    Quote(Quote),
    Profile(CompanyProfile),
    IncomeStatements(Vec<IncomeStatement>),
}

impl MarketData {
    pub fn kind(&self) -> DataKind {
        match self {
            MarketData::Quote(_) => DataKind::Quote,
            MarketData::Profile(_) => DataKind::Profile,
            MarketData::IncomeStatements(_) => DataKind::IncomeStatement,
        }
    }

    /// Symbols named by the records themselves
    pub fn symbols(&self) -> Vec<&str> {
        match self {
            MarketData::Quote(q) => vec![q.symbol.as_str()],
            MarketData::Profile(p) => vec![p.symbol.as_str()],
            MarketData::IncomeStatements(statements) => {
                statements.iter().map(|s| s.symbol.as_str()).collect()
            }
        }
    }
}

/// `quote` record (stable and legacy v3 field names)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Quote {
    pub symbol: String,
    pub name: Option<String>,
    pub price: Option<f64>,
    #[serde(alias = "changePercentage")]
    pub changes_percentage: Option<f64>,
    pub change: Option<f64>,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub year_low: Option<f64>,
    pub year_high: Option<f64>,
    pub market_cap: Option<f64>,
    pub price_avg50: Option<f64>,
    pub price_avg200: Option<f64>,
    pub exchange: Option<String>,
    pub volume: Option<f64>,
    pub avg_volume: Option<f64>,
    pub open: Option<f64>,
    pub previous_close: Option<f64>,
    pub eps: Option<f64>,
    pub pe: Option<f64>,
    pub earnings_announcement: Option<String>,
    pub shares_outstanding: Option<f64>,
    pub timestamp: Option<i64>,
}

/// `profile` record (stable and legacy v3 field names)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyProfile {
    pub symbol: String,
    pub company_name: Option<String>,
    pub price: Option<f64>,
    pub beta: Option<f64>,
    #[serde(alias = "averageVolume")]
    pub vol_avg: Option<f64>,
    #[serde(alias = "marketCap")]
    pub mkt_cap: Option<f64>,
    #[serde(alias = "lastDividend")]
    pub last_div: Option<f64>,
    pub range: Option<String>,
    pub currency: Option<String>,
    pub exchange_short_name: Option<String>,
    pub industry: Option<String>,
    pub sector: Option<String>,
    pub country: Option<String>,
    pub ceo: Option<String>,
    pub full_time_employees: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub ipo_date: Option<String>,
    pub dcf: Option<f64>,
    pub is_etf: Option<bool>,
}

/// `income-statement` record (stable and legacy v3 field names)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IncomeStatement {
    pub date: Option<String>,
    pub symbol: String,
    pub reported_currency: Option<String>,
    #[serde(alias = "fiscalYear")]
    pub calendar_year: Option<String>,
    pub period: Option<String>,
    pub revenue: Option<f64>,
    pub cost_of_revenue: Option<f64>,
    pub gross_profit: Option<f64>,
    pub gross_profit_ratio: Option<f64>,
    pub research_and_development_expenses: Option<f64>,
    pub operating_expenses: Option<f64>,
    pub operating_income: Option<f64>,
    pub operating_income_ratio: Option<f64>,
    pub ebitda: Option<f64>,
    pub net_income: Option<f64>,
    pub net_income_ratio: Option<f64>,
    pub eps: Option<f64>,
    #[serde(rename = "epsdiluted", alias = "epsDiluted")]
    pub eps_diluted: Option<f64>,
}

//
// ================= Generation =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub output_tokens: u32,
}

/// Text returned by a single model call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub run_id: Uuid,
    pub query: Query,
    pub snapshot: MarketSnapshot,
    pub analysis: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
    pub prompt_fingerprint: String,
    pub trace: Vec<String>,
    pub generated_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataKind::Quote => "quote",
            DataKind::Profile => "profile",
            DataKind::IncomeStatement => "income",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quote" | "price" => Ok(DataKind::Quote),
            "profile" | "company" => Ok(DataKind::Profile),
            "income" | "income-statement" | "income_statement" | "financials" => {
                Ok(DataKind::IncomeStatement)
            }
            other => Err(format!(
                "unknown data kind '{}', expected quote, profile or income",
                other
            )),
        }
    }
}

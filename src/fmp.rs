//! Financial Modeling Prep client
//!
//! One GET per run against the `/stable` API. No retries: any failure
//! ends the run before the model is called.

use crate::config::Config;
use crate::error::AgentError;
use crate::models::{
    CompanyProfile, DataKind, IncomeStatement, MarketData, MarketSnapshot, Query, Quote,
};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, error, info};

const PROVIDER: &str = "FMP";
const MAX_ERROR_BODY_CHARS: usize = 300;

/// Source of market data for a resolved query
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self, query: &Query) -> Result<MarketSnapshot>;
}

pub struct FmpClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FmpClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fmp_timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.fmp_api_key.clone(),
            base_url: config.fmp_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, kind: DataKind) -> String {
        let path = match kind {
            DataKind::Quote => "quote",
            DataKind::Profile => "profile",
            DataKind::IncomeStatement => "income-statement",
        };
        format!("{}/stable/{}", self.base_url, path)
    }

    /// Query parameters for one request; the key is appended last
    fn params(&self, query: &Query) -> Vec<(&'static str, String)> {
        let mut params = vec![("symbol", query.symbol.clone())];

        if query.data_kind == DataKind::IncomeStatement {
            params.push(("period", "annual".to_string()));
            params.push(("limit", query.periods.to_string()));
        }

        params.push(("apikey", self.api_key.clone()));
        params
    }

    async fn get_records(&self, query: &Query) -> Result<Value> {
        let url = self.endpoint(query.data_kind);

        debug!(
            symbol = %query.symbol,
            kind = %query.data_kind,
            "Requesting market data"
        );

        let response = self
            .client
            .get(&url)
            .query(&self.params(query))
            .send()
            .await
            .map_err(|e| {
                // reqwest errors carry the URL, which carries the key
                let e = e.without_url();
                error!("FMP request failed: {}", e);
                AgentError::MarketData(format!("request to {} failed: {}", url, e))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            AgentError::MarketData(format!("failed to read FMP response: {}", e.without_url()))
        })?;

        let body: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            error!(status = %status, "FMP returned an error status");
            return Err(classify_status(status, body.as_ref(), &text));
        }

        let body = body.ok_or_else(|| {
            AgentError::MarketData(format!(
                "FMP returned a non-JSON body: {}",
                truncate(&text, MAX_ERROR_BODY_CHARS)
            ))
        })?;

        if let Some(message) = error_message(&body) {
            error!("FMP returned an error message");
            return Err(classify_message(&message));
        }

        Ok(body)
    }
}

#[async_trait]
impl MarketDataSource for FmpClient {
    fn name(&self) -> &'static str {
        "Financial Modeling Prep"
    }

    async fn fetch(&self, query: &Query) -> Result<MarketSnapshot> {
        let start = Instant::now();
        let body = self.get_records(query).await?;
        let data = decode_market_data(query, body)?;

        info!(
            symbol = %query.symbol,
            kind = %query.data_kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Market data received"
        );

        Ok(MarketSnapshot {
            symbol: query.symbol.clone(),
            fetched_at: Utc::now(),
            data,
        })
    }
}

/// Turn an FMP array body into typed market data for the query's endpoint
pub fn decode_market_data(query: &Query, body: Value) -> Result<MarketData> {
    let data = match query.data_kind {
        DataKind::Quote => MarketData::Quote(first_record(query, body)?),
        DataKind::Profile => MarketData::Profile(first_record(query, body)?),
        DataKind::IncomeStatement => {
            let statements = records(query, body)?;
            MarketData::IncomeStatements(statements)
        }
    };

    Ok(data)
}

/// FMP records all name the symbol they describe
trait SymbolRecord {
    fn symbol(&self) -> &str;
}

impl SymbolRecord for Quote {
    fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl SymbolRecord for CompanyProfile {
    fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl SymbolRecord for IncomeStatement {
    fn symbol(&self) -> &str {
        &self.symbol
    }
}

fn records<T: DeserializeOwned + SymbolRecord>(query: &Query, body: Value) -> Result<Vec<T>> {
    let items = match body {
        Value::Array(items) => items,
        // Some endpoints answer with a bare object for a single record
        record @ Value::Object(_) => vec![record],
        other => {
            return Err(AgentError::MarketData(format!(
                "unexpected FMP payload: {}",
                truncate(&other.to_string(), MAX_ERROR_BODY_CHARS)
            )))
        }
    };

    // `{}` and `[{}]` are how FMP says "nothing for that symbol"
    let items: Vec<Value> = items
        .into_iter()
        .filter(|item| !matches!(item, Value::Object(map) if map.is_empty()))
        .collect();

    if items.is_empty() {
        return Err(AgentError::SymbolNotFound(query.symbol.clone()));
    }

    items
        .into_iter()
        .map(|item| {
            let record: T = serde_json::from_value(item).map_err(|e| {
                AgentError::MarketData(format!("malformed {} record: {}", query.data_kind, e))
            })?;
            check_symbol(query, record.symbol())?;
            Ok(record)
        })
        .collect()
}

fn check_symbol(query: &Query, symbol: &str) -> Result<()> {
    if symbol.trim().is_empty() {
        return Err(AgentError::MarketData(format!(
            "FMP {} response carries no symbol",
            query.data_kind
        )));
    }

    if !symbol.trim().eq_ignore_ascii_case(&query.symbol) {
        return Err(AgentError::MarketData(format!(
            "requested {} but FMP returned data for {}",
            query.symbol, symbol
        )));
    }

    Ok(())
}

fn first_record<T: DeserializeOwned + SymbolRecord>(query: &Query, body: Value) -> Result<T> {
    records(query, body)?
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::SymbolNotFound(query.symbol.clone()))
}

fn error_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;
    obj.get("Error Message")
        .or_else(|| obj.get("error"))
        .or_else(|| obj.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn classify_status(status: StatusCode, body: Option<&Value>, text: &str) -> AgentError {
    let detail = body
        .and_then(error_message)
        .unwrap_or_else(|| truncate(text, MAX_ERROR_BODY_CHARS));

    match status {
        StatusCode::UNAUTHORIZED => AgentError::Auth {
            provider: PROVIDER,
            detail,
        },
        StatusCode::FORBIDDEN if mentions_key(&detail) => AgentError::Auth {
            provider: PROVIDER,
            detail,
        },
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited {
            provider: PROVIDER,
            detail,
        },
        _ => AgentError::MarketData(format!("FMP returned {}: {}", status, detail)),
    }
}

fn classify_message(message: &str) -> AgentError {
    let lowered = message.to_lowercase();

    if mentions_key(message) {
        AgentError::Auth {
            provider: PROVIDER,
            detail: message.to_string(),
        }
    } else if lowered.contains("limit reach") || lowered.contains("too many requests") {
        AgentError::RateLimited {
            provider: PROVIDER,
            detail: message.to_string(),
        }
    } else {
        AgentError::MarketData(message.to_string())
    }
}

fn mentions_key(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("api key") || lowered.contains("apikey")
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

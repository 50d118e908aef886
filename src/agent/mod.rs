//! Main orchestrator - one query, one run
//!
//! Start → FetchData → BuildPrompt → GenerateAnswer → Done
//! Any failing step ends the run; there are no loops or retries.

use crate::error::AgentError;
use crate::fmp::MarketDataSource;
use crate::gemini::TextGenerator;
use crate::models::{AnalysisResult, Query};
use crate::prompt::build_prompt;
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Steps of a single run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Start,
    FetchData,
    BuildPrompt,
    GenerateAnswer,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::Start => "Start",
            RunStage::FetchData => "FetchData",
            RunStage::BuildPrompt => "BuildPrompt",
            RunStage::GenerateAnswer => "GenerateAnswer",
            RunStage::Done => "Done",
        };
        write!(f, "{}", s)
    }
}

/// Sequences data retrieval and model invocation for one query
pub struct Orchestrator {
    market_data: Box<dyn MarketDataSource>,
    generator: Box<dyn TextGenerator>,
}

impl Orchestrator {
    pub fn new(
        market_data: Box<dyn MarketDataSource>,
        generator: Box<dyn TextGenerator>,
    ) -> Self {
        Self {
            market_data,
            generator,
        }
    }

    /// Run the fetch → prompt → generate pipeline
    pub async fn run(&self, query: Query) -> Result<AnalysisResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, symbol = %query.symbol);

        self.run_inner(run_id, query)
            .instrument(span)
            .await
            .map_err(|e| {
                error!(
                    %run_id,
                    stage = ?e.stage(),
                    error = %e,
                    "Run failed"
                );
                e
            })
    }

    async fn run_inner(&self, run_id: Uuid, query: Query) -> Result<AnalysisResult> {
        let start_time = Instant::now();
        let mut trace = Vec::new();

        info!(
            kind = %query.data_kind,
            question = %query.question,
            "Agent: starting run"
        );
        trace.push(format!("START: {} ({})", query.symbol, query.data_kind));

        // === FETCH ===
        debug!(source = self.market_data.name(), "Fetching market data");
        let snapshot = self
            .market_data
            .fetch(&query)
            .await
            .map_err(|e| e.at(RunStage::FetchData))?;

        let records = snapshot.data.symbols();
        if records.is_empty() {
            return Err(AgentError::SymbolNotFound(query.symbol.clone()).at(RunStage::FetchData));
        }
        if let Some(other) = records
            .iter()
            .find(|s| !s.trim().eq_ignore_ascii_case(&query.symbol))
        {
            return Err(AgentError::MarketData(format!(
                "requested {} but received data for '{}'",
                query.symbol, other
            ))
            .at(RunStage::FetchData));
        }

        trace.push(format!(
            "FETCH: {} from {} - {} ms",
            snapshot.data.kind(),
            self.market_data.name(),
            start_time.elapsed().as_millis()
        ));

        // === PROMPT ===
        let prompt = build_prompt(&query, &snapshot);
        let prompt_fingerprint = prompt.fingerprint();

        debug!(
            prompt_chars = prompt.text.len(),
            fingerprint = %prompt_fingerprint,
            "Prompt built"
        );
        trace.push(format!("PROMPT: {} chars", prompt.text.len()));

        // === GENERATE ===
        let generate_start = Instant::now();
        debug!(model = self.generator.model(), "Requesting analysis");
        let generation = self
            .generator
            .generate(&prompt.system_instruction, &prompt.text)
            .await
            .map_err(|e| e.at(RunStage::GenerateAnswer))?;

        if generation.text.trim().is_empty() {
            return Err(AgentError::EmptyResponse(format!(
                "{} returned no analysis",
                generation.model
            ))
            .at(RunStage::GenerateAnswer));
        }

        trace.push(format!(
            "GENERATE: {} - {} ms",
            generation.model,
            generate_start.elapsed().as_millis()
        ));

        // === DONE ===
        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        trace.push(format!("DONE: {} ms", elapsed_ms));

        info!(elapsed_ms, "Run complete");

        Ok(AnalysisResult {
            run_id,
            query,
            snapshot,
            analysis: generation.text,
            model: generation.model,
            finish_reason: generation.finish_reason,
            usage: generation.usage,
            prompt_fingerprint,
            trace,
            generated_at: Utc::now(),
            elapsed_ms,
        })
    }
}

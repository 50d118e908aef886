//! Market Analyst Agent
//!
//! Answers one financial question per invocation:
//! - Resolves the query to a ticker symbol
//! - Fetches market data for it from Financial Modeling Prep
//! - Builds a single prompt from the data and the question
//! - Asks Gemini for the analysis and prints it
//!
//! PIPELINE:
//! RESOLVE → FETCH → PROMPT → GENERATE → DONE

pub mod agent;
pub mod config;
pub mod error;
pub mod fmp;
pub mod gemini;
pub mod models;
pub mod output;
pub mod prompt;
pub mod query;

#[cfg(test)]
mod testing;

pub use error::{AgentError, Result};

// Re-export common types
pub use agent::{Orchestrator, RunStage};
pub use config::Config;
pub use models::*;
pub use query::QueryResolver;

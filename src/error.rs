//! Error types for the market analyst agent

use crate::agent::RunStage;
use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Input Errors
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // =============================
    // Provider Errors
    // =============================

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("{provider} rejected the credentials: {detail}")]
    Auth { provider: &'static str, detail: String },

    #[error("{provider} rate limit reached: {detail}")]
    RateLimited { provider: &'static str, detail: String },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Prompt blocked by the model: {0}")]
    Blocked(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),

    // =============================
    // Pipeline Errors
    // =============================

    #[error("{stage} failed: {source}")]
    StageFailed {
        stage: RunStage,
        #[source]
        source: Box<AgentError>,
    },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Wrap an error with the pipeline stage it happened in
    pub fn at(self, stage: RunStage) -> Self {
        match self {
            already @ AgentError::StageFailed { .. } => already,
            other => AgentError::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage the error was raised in, if it has been attributed to one
    pub fn stage(&self) -> Option<RunStage> {
        match self {
            AgentError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The underlying error, looking through stage attribution
    pub fn root(&self) -> &AgentError {
        match self {
            AgentError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Config and query problems: caught before anything is sent over the network
    pub fn is_user_error(&self) -> bool {
        matches!(
            self.root(),
            AgentError::Config(_) | AgentError::InvalidQuery(_)
        )
    }
}

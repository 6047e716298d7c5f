//! Error types for the analysis pipeline.

use thiserror::Error;

/// Failures of a single structured-output call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("response contains neither a parsed object nor JSON output text")]
    NoStructuredResult,

    #[error("structured result does not match schema `{schema}`: {source}")]
    SchemaMismatch {
        schema: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Defects found while filling the step-3 base template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateDefect {
    #[error("slot {0} does not occur in the base template")]
    MissingSlot(&'static str),

    #[error("slot {0} occurs {1} times in the base template")]
    DuplicateSlot(&'static str, usize),

    #[error("slot {0} is still present after substitution")]
    UnresolvedSlot(&'static str),
}

/// Anything that aborts an analysis run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("round {round}, step {step}: {source}")]
    Step {
        round: usize,
        step: u8,
        #[source]
        source: LlmError,
    },

    #[error("round {round}: step-3 instruction is malformed: {source}")]
    TemplateSubstitution {
        round: usize,
        #[source]
        source: TemplateDefect,
    },

    #[error("round {round}: prior step-3 result lacks a usable `{field}`")]
    MalformedCarriedState { round: usize, field: &'static str },

    #[error("round {round}, step {step}: failed to encode payload: {source}")]
    Serialize {
        round: usize,
        step: u8,
        #[source]
        source: serde_json::Error,
    },
}

impl AnalysisError {
    /// Round index the failure belongs to.
    pub fn round(&self) -> usize {
        match self {
            AnalysisError::Step { round, .. }
            | AnalysisError::TemplateSubstitution { round, .. }
            | AnalysisError::MalformedCarriedState { round, .. }
            | AnalysisError::Serialize { round, .. } => *round,
        }
    }
}

//! Typed errors for the ingestion, tool, reasoning, and persistence layers.
//!
//! Component seams return these enums; command-level code wraps them in
//! `anyhow` for display. None of these variants carry panics or raw stack
//! traces — every message is safe to show to the user.

use thiserror::Error;

/// Errors produced while turning an uploaded file into extracted text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The file extension maps to no known format.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// A text file could not be decoded with any known encoding.
    #[error("could not decode text file: {0}")]
    DecodeFailure(String),

    /// The file matched a known format but both the primary and fallback
    /// extractors failed on it.
    #[error("unsupported or corrupt document: {0}")]
    UnsupportedOrCorrupt(String),

    /// A packet capture contained no parseable packets.
    #[error("no packets found in capture file")]
    NoPacketsFound,
}

/// Errors surfaced by tool dispatch.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The reasoning loop asked for a tool that is not in the catalogue.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Retrieval was attempted before any document was loaded. Recovered
    /// by the loop as an observation, never fatal.
    #[error("no document has been loaded yet; ingest a document before searching")]
    EmptyIndex,

    /// The calculator rejected or failed to evaluate an expression.
    #[error("calculation error: {0}")]
    CalculationError(String),

    /// The tool exists but its external collaborator is not configured
    /// (e.g. web search without an API key).
    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    /// A tool input was not plain text.
    #[error("invalid tool input: {0}")]
    InvalidInput(String),

    /// An external lookup failed at the network layer.
    #[error("lookup failed: {0}")]
    LookupFailed(String),
}

/// Errors from the reasoning loop and its language-model collaborator.
#[derive(Debug, Error)]
pub enum AgentError {
    /// A model turn could not be parsed as an Action or a Final Answer,
    /// and the retry budget is exhausted.
    #[error("could not parse model response: {0}")]
    ReasoningParseError(String),

    /// The loop hit the iteration cap without producing a final answer.
    #[error("reasoning did not complete within {0} iterations")]
    IterationLimitExceeded(u32),

    /// The language-model call itself failed (network, auth, timeout).
    #[error("language model error: {0}")]
    Llm(String),
}

/// Errors from the durable interaction log.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Writing the persisted log failed. The in-memory window is intact.
    #[error("failed to persist interaction log: {0}")]
    PersistenceWriteError(String),

    /// Feedback was addressed to an interaction id that does not exist.
    #[error("no interaction with id {0}")]
    UnknownInteraction(usize),
}

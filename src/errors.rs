//! Error taxonomy for the pipeline
//!
//! Every variant except `NoFragments` is recovered where it occurs: parse
//! failures fall back to the token-level classifier path, ambiguous
//! resolution yields an indeterminate classification, sandbox failures yield
//! an inconclusive attempt, and scanner problems empty the external report
//! section. No condition from a single fragment or project may abort the
//! processing of others.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fragment could not be parsed into a syntax tree
    #[error("parse failure: {0}")]
    ParseFailure(String),

    /// Static resolution needed more than the permitted indirection
    #[error("ambiguous resolution: {0}")]
    AmbiguousResolution(String),

    /// Sandboxed execution of extracted code raised or was cancelled
    #[error("sandbox execution failure: {0}")]
    SandboxExecutionFailure(String),

    /// External scanner is not installed or not on PATH
    #[error("external tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    /// External scanner ran but exited abnormally or produced garbage
    #[error("external tool failure: {0}")]
    ExternalToolFailure(String),

    /// The run was started with no fragments at all; the one configuration
    /// error surfaced to the caller
    #[error("no code fragments supplied")]
    NoFragments,
}

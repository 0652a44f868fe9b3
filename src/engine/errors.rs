//! Error types for simulation construction and execution.

use thiserror::Error;

/// Errors that can occur while building or running a simulation state.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// All configuration inconsistencies (unknown term or proposal names,
/// numeric-input mismatches, incompatible capability sets) are detected while
/// the state is being built and surface as [`EngineError::Spec`]; a state
/// that constructs successfully never degrades into one of these mid-chain.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error in a network, model, or proposal specification.
    #[error("specification error: {0}")]
    Spec(String),

    /// Runtime evaluation error (e.g., a term hook failing mid-step).
    #[error("execution error: {0}")]
    Execution(String),

    /// Numerical stability error (NaN/Inf weights, statistics, or ratios).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

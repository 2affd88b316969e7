//! Error taxonomy for the resource optimizer.
//!
//! Every variant carries a typed kind rather than a bare string so callers
//! can decide propagation (retry, skip, feed the circuit breaker) without
//! parsing messages.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while sizing, gating, or applying a recommendation.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration resource field; rejected at admission.
    #[error("config error: {0}")]
    Config(String),

    /// Samples, duration, or variance below policy. Never feeds the
    /// circuit breaker and never surfaces as a cycle failure.
    #[error("insufficient data: {0}")]
    DataInsufficient(String),

    /// Transient orchestrator failure (5xx, timeout). Retried with
    /// exponential backoff; feeds the breaker once retries are exhausted.
    #[error("transient orchestrator error after {attempts} attempt(s): {message}")]
    OrchestratorTransient {
        /// Attempts made before giving up.
        attempts: u32,
        /// Underlying message.
        message: String,
    },

    /// Permanent orchestrator failure (4xx, excluding conflict). Logged,
    /// not retried, feeds the breaker.
    #[error("permanent orchestrator error: {0}")]
    OrchestratorPermanent(String),

    /// A policy's condition failed to compile. Disables that policy for
    /// the cycle; never fatal.
    #[error("policy compile error in {policy}: {message}")]
    PolicyCompile {
        /// Name of the offending policy.
        policy: String,
        /// Compiler diagnostic.
        message: String,
    },

    /// A policy's condition evaluated but did not return a boolean, or
    /// raised at runtime. Disables the policy for this evaluation only.
    #[error("policy runtime error in {policy}: {message}")]
    PolicyRuntime {
        /// Name of the offending policy.
        policy: String,
        /// Evaluator diagnostic.
        message: String,
    },

    /// Not a failure: a gate in the safety envelope vetoed the apply.
    /// Recorded as a typed reason, never propagated as a hard error.
    #[error("safety veto: {0}")]
    SafetyVeto(String),

    /// An invariant was violated (negative percentile, unsorted ring
    /// buffer, etc). Fatal to the current cycle only.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// Serialization/deserialization failure on a persisted snapshot.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure while reading or writing a persisted snapshot.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapper for caller/binary-boundary errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// True for conditions the circuit breaker must count as a failure.
    ///
    /// `DataInsufficient`, `PolicyCompile`/`PolicyRuntime`, and
    /// `SafetyVeto` are all expected, recoverable conditions and must
    /// never move the breaker toward `Open`.
    pub fn feeds_circuit_breaker(&self) -> bool {
        matches!(
            self,
            Error::OrchestratorTransient { .. } | Error::OrchestratorPermanent(_)
        )
    }
}

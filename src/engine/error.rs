//! Error types for payment sessions.

use thiserror::Error;

use crate::Amount;
use crate::gateway::GatewayError;

/// Top-level error returned by [`PaymentEngine::generate`](super::PaymentEngine::generate).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("code generation failed: {0}")]
    Generate(#[from] GenerateError),

    /// The session was cancelled or replaced while its code was being generated.
    #[error("session was superseded before its code was ready")]
    Superseded,
}

/// Error during code generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("invalid amount {0}: must be greater than zero")]
    InvalidAmount(Amount),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

impl From<GatewayError> for GenerateError {
    fn from(error: GatewayError) -> Self {
        GenerateError::GatewayUnavailable(error.to_string())
    }
}

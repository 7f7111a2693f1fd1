//! Boundary to the remote payment gateway.

use async_trait::async_trait;
use thiserror::Error;

use crate::Amount;
use crate::model::{CorrelationId, GeneratedCode, TransactionStatus};

mod scripted;
pub use scripted::{PollStep, ScriptedGateway};

/// Failure of a single gateway call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The request never got a response (timeout, connection refused, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway answered with a non-successful response.
    #[error("gateway responded with status {status}: {message}")]
    Status { status: u16, message: String },
}

/// The three remote operations the engine consumes.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// CreateCode: obtain a payment code and its correlation id.
    async fn create_code(&self, amount: Amount) -> Result<GeneratedCode, GatewayError>;

    /// RenderCodeImage: fetch the rendered image of a generated code.
    async fn render_code_image(
        &self,
        code: &str,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<u8>, GatewayError>;

    /// CheckTransaction: look up the payment status behind a correlation id.
    async fn check_transaction(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<TransactionStatus, GatewayError>;
}

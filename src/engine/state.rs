use std::sync::Arc;

use super::cancel::CancellationHandle;
use crate::model::{CodePayload, CorrelationId, TransactionRecord};

/// Message of the failure forced by the expiry window.
pub const EXPIRED_MESSAGE: &str = "Payment time expired. Please generate a new code.";

/// Observable state of the payment engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PaymentState {
    #[default]
    Idle,
    Loading,
    /// Code shown to the payer; polling and countdown are running.
    CodeReady(Arc<CodePayload>),
    /// The gateway confirmed the transfer.
    Success(TransactionRecord),
    /// The gateway rejected the transfer, or the window expired.
    Failure(String),
    /// No code could be generated.
    Error(String),
}

impl PaymentState {
    pub fn is_terminal(&self) -> bool {
        match self {
            PaymentState::Success(_) | PaymentState::Failure(_) | PaymentState::Error(_) => true,
            PaymentState::Idle | PaymentState::Loading | PaymentState::CodeReady(_) => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PaymentState::Idle => "idle",
            PaymentState::Loading => "loading",
            PaymentState::CodeReady(_) => "code_ready",
            PaymentState::Success(_) => "success",
            PaymentState::Failure(_) => "failure",
            PaymentState::Error(_) => "error",
        }
    }
}

/// The current payment attempt and the handles of its background tasks.
///
/// The handles are cancelled as soon as the attempt settles; the session itself is kept
/// until it is reset or replaced so its correlation id stays readable.
pub(super) struct PaymentSession {
    pub correlation_id: CorrelationId,
    pub poller: CancellationHandle,
    pub countdown: CancellationHandle,
}

impl PaymentSession {
    /// Stop both background tasks together.
    pub fn cancel(&self) {
        self.poller.cancel();
        self.countdown.cancel();
    }
}

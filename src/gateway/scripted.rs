use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::{GatewayError, PaymentGateway};
use crate::Amount;
use crate::model::{CorrelationId, GeneratedCode, TransactionRecord, TransactionStatus};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// One scripted answer to a CheckTransaction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Status(TransactionStatus),
    TransportError(String),
}

impl PollStep {
    pub fn pending() -> Self {
        PollStep::Status(TransactionStatus::pending())
    }

    pub fn confirmed(record: TransactionRecord) -> Self {
        PollStep::Status(TransactionStatus::confirmed(record))
    }

    /// Confirmation with a placeholder record for `amount`, timestamped now.
    pub fn confirmed_for(hash: &str, amount: Amount) -> Self {
        let now = Utc::now();
        Self::confirmed(TransactionRecord {
            hash: hash.to_string(),
            from_account: "payer".to_string(),
            to_account: "merchant".to_string(),
            currency: "USD".to_string(),
            amount,
            created_at: now,
            acknowledged_at: now,
            external_ref: None,
        })
    }

    /// A rejection; `code` should be a wire value other than 0 or 1.
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        PollStep::Status(TransactionStatus::with_code(code, message))
    }

    pub fn transport(message: impl Into<String>) -> Self {
        PollStep::TransportError(message.into())
    }
}

/// In-memory gateway that replays a script of poll answers.
///
/// Once the script is exhausted every status query answers `pending`.
/// Call counts and the instant of every status query are recorded for inspection.
pub struct ScriptedGateway {
    code: GeneratedCode,
    create_failure: Option<GatewayError>,
    create_latency: Duration,
    render_image: bool,
    check_latency: Duration,
    steps: Mutex<VecDeque<PollStep>>,
    create_calls: AtomicUsize,
    render_calls: AtomicUsize,
    checks: Mutex<Vec<Instant>>,
}

/// Builder API
impl ScriptedGateway {
    pub fn new(code: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            code: GeneratedCode {
                code: code.into(),
                correlation_id: CorrelationId::new(correlation_id),
            },
            create_failure: None,
            create_latency: Duration::ZERO,
            render_image: true,
            check_latency: Duration::ZERO,
            steps: Mutex::new(VecDeque::new()),
            create_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            checks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_steps(self, steps: impl IntoIterator<Item = PollStep>) -> Self {
        self.steps.lock().extend(steps);
        self
    }

    /// Make every CreateCode call fail with `error`.
    pub fn failing_create(mut self, error: GatewayError) -> Self {
        self.create_failure = Some(error);
        self
    }

    /// Make every RenderCodeImage call fail.
    pub fn failing_render(mut self) -> Self {
        self.render_image = false;
        self
    }

    pub fn with_create_latency(mut self, latency: Duration) -> Self {
        self.create_latency = latency;
        self
    }

    pub fn with_check_latency(mut self, latency: Duration) -> Self {
        self.check_latency = latency;
        self
    }
}

/// Inspection API
impl ScriptedGateway {
    pub fn push_step(&self, step: PollStep) {
        self.steps.lock().push_back(step);
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn render_calls(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.checks.lock().len()
    }

    /// Instants at which CheckTransaction was entered, in call order.
    pub fn check_instants(&self) -> Vec<Instant> {
        self.checks.lock().clone()
    }

    /// Placeholder image: PNG signature followed by the code text.
    pub fn placeholder_image(code: &str) -> Vec<u8> {
        let mut image = PNG_SIGNATURE.to_vec();
        image.extend_from_slice(code.as_bytes());
        image
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_code(&self, amount: Amount) -> Result<GeneratedCode, GatewayError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if !self.create_latency.is_zero() {
            tokio::time::sleep(self.create_latency).await;
        }
        debug!(amount = %amount, code = %self.code.code, "scripted create_code");

        match &self.create_failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.code.clone()),
        }
    }

    async fn render_code_image(
        &self,
        code: &str,
        _correlation_id: &CorrelationId,
    ) -> Result<Vec<u8>, GatewayError> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if self.render_image {
            Ok(Self::placeholder_image(code))
        } else {
            Err(GatewayError::Status {
                status: 500,
                message: "image rendering unavailable".to_string(),
            })
        }
    }

    async fn check_transaction(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<TransactionStatus, GatewayError> {
        self.checks.lock().push(Instant::now());
        if !self.check_latency.is_zero() {
            tokio::time::sleep(self.check_latency).await;
        }

        let step = self.steps.lock().pop_front().unwrap_or_else(PollStep::pending);
        debug!(correlation_id = %correlation_id, step = ?step, "scripted check_transaction");

        match step {
            PollStep::Status(status) => Ok(status),
            PollStep::TransportError(message) => Err(GatewayError::Transport(message)),
        }
    }
}

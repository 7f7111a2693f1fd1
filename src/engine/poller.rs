use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, info, info_span, warn};

use super::cancel::{CancelSignal, CancellationHandle, cancellation};
use crate::gateway::PaymentGateway;
use crate::model::{CorrelationId, ResponseCode, TransactionRecord, TransactionStatus};

/// Terminal result of a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success(TransactionRecord),
    Failure(String),
}

impl PollOutcome {
    /// Classify a status answer; `None` means keep polling.
    pub fn from_status(status: TransactionStatus) -> Option<Self> {
        match (status.response_code, status.record) {
            (ResponseCode::Confirmed, Some(record)) => Some(PollOutcome::Success(record)),
            (ResponseCode::Pending, _) => None,
            // a confirmation without a record cannot be acknowledged
            (ResponseCode::Confirmed, None) | (ResponseCode::Rejected(_), _) => {
                Some(PollOutcome::Failure(status.message))
            }
        }
    }
}

/// Queries the gateway on a fixed cadence until the transaction settles.
#[derive(Clone)]
pub struct Poller {
    gateway: Arc<dyn PaymentGateway>,
    interval: Duration,
}

impl Poller {
    pub fn new(gateway: Arc<dyn PaymentGateway>, interval: Duration) -> Self {
        Self { gateway, interval }
    }

    /// Spawn the polling loop for `correlation_id`.
    ///
    /// The first query fires immediately. `on_result` runs at most once, and never after
    /// the returned handle is cancelled.
    pub fn start<F>(&self, correlation_id: CorrelationId, on_result: F) -> CancellationHandle
    where
        F: FnOnce(PollOutcome) + Send + 'static,
    {
        let (handle, signal) = cancellation();
        let span = info_span!("poll", correlation_id = %correlation_id);
        tokio::spawn(
            poll_loop(
                self.gateway.clone(),
                self.interval,
                correlation_id,
                signal,
                on_result,
            )
            .instrument(span),
        );
        handle
    }
}

async fn poll_loop<F>(
    gateway: Arc<dyn PaymentGateway>,
    period: Duration,
    correlation_id: CorrelationId,
    mut signal: CancelSignal,
    on_result: F,
) where
    F: FnOnce(PollOutcome),
{
    let mut ticker = interval(period);
    // a slow query pushes the next one a full period out
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = signal.cancelled() => break,
            _ = ticker.tick() => {}
        }

        attempt += 1;
        let response = tokio::select! {
            biased;
            _ = signal.cancelled() => break,
            response = gateway.check_transaction(&correlation_id) => response,
        };

        let status = match response {
            Ok(status) => status,
            Err(e) => {
                warn!(attempt, reason = %e, "status query failed, retrying next interval");
                continue;
            }
        };

        match PollOutcome::from_status(status) {
            None => debug!(attempt, "transaction pending"),
            Some(outcome) => {
                if signal.is_cancelled() {
                    break;
                }
                info!(attempt, outcome = ?outcome, "transaction settled");
                on_result(outcome);
                return;
            }
        }
    }

    debug!(attempt, "polling cancelled");
}

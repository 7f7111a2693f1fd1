//! Payment session engine.
//!
//! The engine owns the single authoritative [`PaymentState`]. Generating a code starts two
//! background tasks bound to the session: a poller querying the gateway and a countdown
//! bounding the session. The first terminal signal wins; every later one is dropped.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::Amount;
use crate::config::SessionConfig;
use crate::gateway::PaymentGateway;
use crate::model::{CodePayload, CorrelationId, PaymentRequest};

mod cancel;
pub use cancel::{CancelSignal, CancellationHandle, cancellation};

mod countdown;
pub use countdown::Countdown;

mod error;
pub use error::{EngineError, GenerateError};

mod generator;
pub use generator::CodeGenerator;

mod poller;
pub use poller::{PollOutcome, Poller};

mod state;
pub use state::{EXPIRED_MESSAGE, PaymentState};
use state::PaymentSession;

const TRANSITION_BUFFER: usize = 64;

/// The payment session state machine.
///
/// Dropping the engine cancels the background tasks of its session.
pub struct PaymentEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    generator: CodeGenerator,
    poller: Poller,
    countdown: Countdown,
    core: Mutex<Core>,
    state_tx: watch::Sender<PaymentState>,
    remaining_tx: watch::Sender<u32>,
    transitions_tx: broadcast::Sender<PaymentState>,
}

/// Mutable part of the engine, only touched under the `core` lock.
struct Core {
    /// Bumped by every `generate` and `cancel`; callbacks carry the epoch they were
    /// started with and are dropped once it is stale
    epoch: u64,
    session: Option<PaymentSession>,
}

/// Public API
impl PaymentEngine {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: SessionConfig) -> Self {
        let (state_tx, _) = watch::channel(PaymentState::Idle);
        let (remaining_tx, _) = watch::channel(0);
        let (transitions_tx, _) = broadcast::channel(TRANSITION_BUFFER);

        Self {
            inner: Arc::new(Inner {
                config,
                generator: CodeGenerator::new(gateway.clone()),
                poller: Poller::new(gateway, config.poll_interval()),
                countdown: Countdown::new(config.expiry_secs()),
                core: Mutex::new(Core {
                    epoch: 0,
                    session: None,
                }),
                state_tx,
                remaining_tx,
                transitions_tx,
            }),
        }
    }

    pub fn config(&self) -> SessionConfig {
        self.inner.config
    }

    /// Start a new payment attempt for `amount`:
    /// - Reject non-positive amounts without touching the current session
    /// - Cancel any previous session and enter `Loading`
    /// - On a generated code enter `CodeReady` and start polling and the countdown
    /// - On a generation failure enter `Error`
    pub async fn generate(&self, amount: Amount) -> Result<CodePayload, EngineError> {
        let request = match PaymentRequest::new(amount) {
            Ok(request) => request,
            Err(e) => {
                info!(amount = %amount, reason = %e, "generate skipped");
                return Err(e.into());
            }
        };

        let epoch = self.inner.begin();
        let result = self.inner.generator.generate(request).await;
        self.inner.complete(epoch, result)
    }

    /// Cancel the current session, if any, and return to `Idle`.
    ///
    /// Safe to call repeatedly; only the first call after a session produces a transition.
    pub fn cancel(&self) {
        let mut core = self.inner.core.lock();
        core.epoch += 1;
        if let Some(session) = core.session.take() {
            session.cancel();
            info!(correlation_id = %session.correlation_id, "session cancelled");
        }
        self.inner.remaining_tx.send_replace(0);
        self.inner.set_state(PaymentState::Idle);
    }

    /// Alias of [`cancel`](Self::cancel), for returning to `Idle` after a terminal state.
    pub fn reset(&self) {
        self.cancel();
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> PaymentState {
        self.inner.state_tx.borrow().clone()
    }

    /// Read-only subscription to the latest state.
    pub fn subscribe(&self) -> watch::Receiver<PaymentState> {
        self.inner.state_tx.subscribe()
    }

    /// Every state transition from now on, in order.
    ///
    /// A subscriber that falls more than 64 transitions behind skips the oldest ones.
    pub fn transitions(&self) -> impl Stream<Item = PaymentState> + Unpin + Send + 'static {
        BroadcastStream::new(self.inner.transitions_tx.subscribe()).filter_map(Result::ok)
    }

    /// Seconds left in the current expiry window; 0 when no session is running.
    pub fn remaining_seconds(&self) -> u32 {
        *self.inner.remaining_tx.borrow()
    }

    /// Read-only subscription to the countdown.
    pub fn subscribe_countdown(&self) -> watch::Receiver<u32> {
        self.inner.remaining_tx.subscribe()
    }

    /// Correlation id of the current session, until it is reset or replaced.
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        let core = self.inner.core.lock();
        core.session.as_ref().map(|s| s.correlation_id.clone())
    }

    /// Wait until the engine is terminal or idle, and return that state.
    pub async fn settled(&self) -> PaymentState {
        let mut rx = self.inner.state_tx.subscribe();
        let settled = rx
            .wait_for(|state| state.is_terminal() || *state == PaymentState::Idle)
            .await
            .map(|state| state.clone());
        settled.unwrap_or_else(|_| self.state())
    }
}

impl Drop for PaymentEngine {
    fn drop(&mut self) {
        let mut core = self.inner.core.lock();
        core.epoch += 1;
        if let Some(session) = core.session.take() {
            session.cancel();
        }
    }
}

/// Private API
impl Inner {
    /// Apply a state, notifying observers if it changed.
    ///
    /// Callers hold the `core` lock so transitions are observed in the order applied.
    fn set_state(&self, next: PaymentState) -> bool {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next.clone();
            true
        });

        if changed {
            info!(state = next.name(), "payment state changed");
            // no subscribers is fine
            let _ = self.transitions_tx.send(next);
        }
        changed
    }

    fn is_code_ready(&self) -> bool {
        matches!(*self.state_tx.borrow(), PaymentState::CodeReady(_))
    }

    /// Supersede the current session and enter `Loading`; return the new epoch.
    fn begin(&self) -> u64 {
        let mut core = self.core.lock();
        core.epoch += 1;
        if let Some(previous) = core.session.take() {
            previous.cancel();
            info!(correlation_id = %previous.correlation_id, "previous session superseded");
        }
        self.remaining_tx.send_replace(0);
        self.set_state(PaymentState::Loading);
        core.epoch
    }

    /// Apply the result of code generation started at `epoch`.
    fn complete(
        self: &Arc<Self>,
        epoch: u64,
        result: Result<CodePayload, GenerateError>,
    ) -> Result<CodePayload, EngineError> {
        let mut core = self.core.lock();
        if core.epoch != epoch {
            debug!(epoch, current = core.epoch, "discarding stale code generation");
            return Err(EngineError::Superseded);
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                self.set_state(PaymentState::Error(e.to_string()));
                return Err(e.into());
            }
        };

        let correlation_id = payload.correlation_id.clone();
        let payload = Arc::new(payload);
        core.session = Some(PaymentSession {
            poller: self.start_poller(epoch, correlation_id.clone()),
            countdown: self.start_countdown(epoch),
            correlation_id,
        });
        self.remaining_tx.send_replace(self.config.expiry_secs());
        self.set_state(PaymentState::CodeReady(payload.clone()));

        Ok(CodePayload::clone(&payload))
    }

    fn start_poller(
        self: &Arc<Self>,
        epoch: u64,
        correlation_id: CorrelationId,
    ) -> CancellationHandle {
        let weak = Arc::downgrade(self);
        self.poller.start(correlation_id, move |outcome| {
            let next = match outcome {
                PollOutcome::Success(record) => PaymentState::Success(record),
                PollOutcome::Failure(message) => PaymentState::Failure(message),
            };
            with_inner(&weak, |inner| inner.settle(epoch, next));
        })
    }

    fn start_countdown(self: &Arc<Self>, epoch: u64) -> CancellationHandle {
        let on_tick = {
            let weak = Arc::downgrade(self);
            move |remaining| {
                with_inner(&weak, |inner| inner.tick(epoch, remaining));
            }
        };
        let on_expire = {
            let weak = Arc::downgrade(self);
            move || {
                with_inner(&weak, |inner| {
                    inner.settle(epoch, PaymentState::Failure(EXPIRED_MESSAGE.to_string()))
                });
            }
        };
        self.countdown.start(on_tick, on_expire)
    }

    /// Move a `CodeReady` session of `epoch` to the terminal state `next`.
    ///
    /// First writer wins: returns false, changing nothing, when the session is stale or
    /// already settled.
    fn settle(&self, epoch: u64, next: PaymentState) -> bool {
        let core = self.core.lock();
        if core.epoch != epoch || !self.is_code_ready() {
            debug!(epoch, state = next.name(), "ignoring late session signal");
            return false;
        }

        if let Some(session) = core.session.as_ref() {
            session.cancel();
        }
        self.remaining_tx.send_replace(0);
        self.set_state(next)
    }

    fn tick(&self, epoch: u64, remaining: u32) {
        let core = self.core.lock();
        if core.epoch != epoch || !self.is_code_ready() {
            return;
        }
        self.remaining_tx.send_replace(remaining);
    }
}

/// Run `f` against the engine if it is still alive.
fn with_inner<R>(weak: &Weak<Inner>, f: impl FnOnce(&Inner) -> R) -> Option<R> {
    weak.upgrade().map(|inner| f(&inner))
}

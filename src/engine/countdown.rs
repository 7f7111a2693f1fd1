use std::time::Duration;
use tokio::time::interval;
use tracing::{Instrument, debug, info, info_span};

use super::cancel::{CancelSignal, CancellationHandle, cancellation};

const TICK: Duration = Duration::from_secs(1);

/// Counts an expiry window down one second at a time.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    seconds: u32,
}

impl Countdown {
    pub fn new(seconds: u32) -> Self {
        Self { seconds }
    }

    /// Spawn the countdown.
    ///
    /// `on_tick` sees the full window right away, then every decrement down to 0.
    /// `on_expire` runs once after the final tick unless the handle was cancelled first.
    pub fn start<T, E>(&self, on_tick: T, on_expire: E) -> CancellationHandle
    where
        T: FnMut(u32) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let (handle, signal) = cancellation();
        let span = info_span!("countdown", seconds = self.seconds);
        tokio::spawn(count_down(self.seconds, signal, on_tick, on_expire).instrument(span));
        handle
    }
}

async fn count_down<T, E>(seconds: u32, mut signal: CancelSignal, mut on_tick: T, on_expire: E)
where
    T: FnMut(u32),
    E: FnOnce(),
{
    let mut ticker = interval(TICK);
    let mut remaining = seconds;

    loop {
        tokio::select! {
            biased;
            _ = signal.cancelled() => {
                debug!(remaining, "countdown cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        on_tick(remaining);
        if remaining == 0 {
            break;
        }
        remaining -= 1;
    }

    if !signal.is_cancelled() {
        info!("expiry window elapsed");
        on_expire();
    }
}

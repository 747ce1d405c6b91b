//! Coin line polling thread.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SignalConfig;
use crate::events::{BoothEvent, InsertSource, StateCell};
use crate::platform::gpio::SignalSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Line inactive.
    Quiet,
    /// A coin event was queued for the controller.
    Raised,
    /// Line active, but the booth is busy or an insert is already in flight.
    Ignored,
    Unreadable,
    /// The controller has gone away.
    Disconnected,
}

pub struct CoinMonitor {
    signal: Arc<dyn SignalSource>,
    state: StateCell,
    events: Sender<BoothEvent>,
    healthy: bool,
}

impl CoinMonitor {
    pub fn new(signal: Arc<dyn SignalSource>, state: StateCell, events: Sender<BoothEvent>) -> Self {
        Self {
            signal,
            state,
            events,
            healthy: true,
        }
    }

    /// Read the line once and raise at most one coin event.
    pub fn poll(&mut self) -> PollOutcome {
        let active = match self.signal.read() {
            Ok(active) => active,
            Err(err) => {
                if self.healthy {
                    warn!("coin signal unreadable: {err}");
                    self.healthy = false;
                }
                return PollOutcome::Unreadable;
            }
        };
        if !self.healthy {
            info!("coin signal readable again");
            self.healthy = true;
        }
        if !active {
            return PollOutcome::Quiet;
        }
        if !self.state.try_claim_insert() {
            return PollOutcome::Ignored;
        }

        self.set_indicator(true);
        if self
            .events
            .send(BoothEvent::Insert(InsertSource::Coin))
            .is_err()
        {
            self.state.release_insert();
            self.set_indicator(false);
            return PollOutcome::Disconnected;
        }
        info!("coin detected");
        PollOutcome::Raised
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    pub fn set_indicator(&self, on: bool) {
        if let Err(err) = self.signal.write_indicator(on) {
            debug!(on, "indicator write failed: {err}");
        }
    }
}

/// Start the monitor thread. It runs until `cancel` fires or the event
/// receiver is dropped.
pub fn spawn(
    signal: Arc<dyn SignalSource>,
    state: StateCell,
    events: Sender<BoothEvent>,
    cfg: &SignalConfig,
    cancel: CancellationToken,
) -> io::Result<JoinHandle<()>> {
    let poll_interval = cfg.poll_interval.max(Duration::from_millis(1));
    let debounce = cfg.debounce;
    let mut monitor = CoinMonitor::new(signal, state, events);
    thread::Builder::new()
        .name("coin-monitor".into())
        .spawn(move || {
            debug!(?poll_interval, ?debounce, "coin monitor started");
            while !cancel.is_cancelled() {
                match monitor.poll() {
                    PollOutcome::Raised => {
                        thread::sleep(debounce);
                        monitor.set_indicator(false);
                    }
                    PollOutcome::Disconnected => {
                        debug!("controller gone; coin monitor exiting");
                        break;
                    }
                    PollOutcome::Quiet | PollOutcome::Ignored | PollOutcome::Unreadable => {
                        thread::sleep(poll_interval);
                    }
                }
            }
            debug!("coin monitor stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use crate::events::BoothState;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeSignal {
        active: AtomicBool,
        broken: AtomicBool,
        indicator: Mutex<Vec<bool>>,
    }

    impl SignalSource for FakeSignal {
        fn read(&self) -> Result<bool, SignalError> {
            if self.broken.load(Ordering::SeqCst) {
                return Err(SignalError::BadValue {
                    path: PathBuf::from("/sys/class/gpio/gpio17/value"),
                    value: "?".into(),
                });
            }
            Ok(self.active.load(Ordering::SeqCst))
        }

        fn write_indicator(&self, on: bool) -> Result<(), SignalError> {
            self.indicator.lock().unwrap().push(on);
            Ok(())
        }
    }

    #[test]
    fn held_line_raises_one_event_per_idle_period() {
        let signal = Arc::new(FakeSignal::default());
        signal.active.store(true, Ordering::SeqCst);
        let state = StateCell::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut monitor = CoinMonitor::new(signal.clone(), state.clone(), tx);

        assert_eq!(monitor.poll(), PollOutcome::Raised);
        assert_eq!(monitor.poll(), PollOutcome::Ignored);
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(signal.indicator.lock().unwrap().as_slice(), &[true]);

        // Controller leaves Idle and releases the latch: still no new events.
        state.store(BoothState::InitialCountdown);
        state.release_insert();
        assert_eq!(monitor.poll(), PollOutcome::Ignored);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unreadable_signal_is_survivable() {
        let signal = Arc::new(FakeSignal::default());
        signal.broken.store(true, Ordering::SeqCst);
        let (tx, _rx) = crossbeam_channel::unbounded();
        let mut monitor = CoinMonitor::new(signal.clone(), StateCell::new(), tx);
        assert_eq!(monitor.poll(), PollOutcome::Unreadable);
        assert_eq!(monitor.poll(), PollOutcome::Unreadable);
        assert!(!monitor.is_healthy());
        signal.broken.store(false, Ordering::SeqCst);
        assert_eq!(monitor.poll(), PollOutcome::Quiet);
        assert!(monitor.is_healthy());
    }

    #[test]
    fn dropped_receiver_releases_latch() {
        let signal = Arc::new(FakeSignal::default());
        signal.active.store(true, Ordering::SeqCst);
        let state = StateCell::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let mut monitor = CoinMonitor::new(signal.clone(), state.clone(), tx);
        assert_eq!(monitor.poll(), PollOutcome::Disconnected);
        assert!(!state.insert_pending());
        assert_eq!(signal.indicator.lock().unwrap().as_slice(), &[true, false]);
    }
}

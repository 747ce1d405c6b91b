use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use rust_photo_booth::config::{SignalConfig, SignalKind};
use rust_photo_booth::error::SignalError;
use rust_photo_booth::events::{BoothEvent, InsertSource, StateCell};
use rust_photo_booth::platform::gpio::SignalSource;
use rust_photo_booth::tasks::monitor;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeLine {
    active: AtomicBool,
    failing: AtomicBool,
    reads: AtomicUsize,
    indicator: Mutex<Vec<bool>>,
}

impl SignalSource for FakeLine {
    fn read(&self) -> Result<bool, SignalError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SignalError::BadValue {
                path: PathBuf::from("/sys/class/gpio/gpio17/value"),
                value: String::new(),
            });
        }
        Ok(self.active.load(Ordering::SeqCst))
    }

    fn write_indicator(&self, on: bool) -> Result<(), SignalError> {
        self.indicator.lock().unwrap().push(on);
        Ok(())
    }
}

fn signal_config() -> SignalConfig {
    SignalConfig {
        kind: SignalKind::Disabled,
        poll_interval: Duration::from_millis(5),
        debounce: Duration::from_millis(20),
        ..SignalConfig::default()
    }
}

#[test]
fn held_coin_line_raises_a_single_event() {
    let line = Arc::new(FakeLine::default());
    line.active.store(true, Ordering::SeqCst);
    let state = StateCell::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let cancel = CancellationToken::new();

    let handle = monitor::spawn(
        line.clone(),
        state.clone(),
        tx,
        &signal_config(),
        cancel.clone(),
    )
    .unwrap();

    let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event, BoothEvent::Insert(InsertSource::Coin));
    // Nobody consumes the event, so the latch stays held and no more are raised.
    std::thread::sleep(Duration::from_millis(150));
    assert!(rx.try_recv().is_err());
    assert!(state.insert_pending());

    cancel.cancel();
    handle.join().unwrap();
    let indicator = line.indicator.lock().unwrap().clone();
    assert_eq!(indicator, vec![true, false]);
}

#[test]
fn unreadable_line_keeps_polling() {
    let line = Arc::new(FakeLine::default());
    line.failing.store(true, Ordering::SeqCst);
    let (tx, rx) = crossbeam_channel::unbounded();
    let cancel = CancellationToken::new();
    let handle = monitor::spawn(
        line.clone(),
        StateCell::new(),
        tx,
        &signal_config(),
        cancel.clone(),
    )
    .unwrap();

    std::thread::sleep(Duration::from_millis(60));
    assert!(line.reads.load(Ordering::SeqCst) > 2);
    line.failing.store(false, Ordering::SeqCst);
    line.active.store(true, Ordering::SeqCst);
    assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

    cancel.cancel();
    handle.join().unwrap();
}

#[test]
fn monitor_exits_when_controller_is_gone() {
    let line = Arc::new(FakeLine::default());
    line.active.store(true, Ordering::SeqCst);
    let state = StateCell::new();
    let (tx, rx) = crossbeam_channel::unbounded::<BoothEvent>();
    drop(rx);
    let handle = monitor::spawn(
        line,
        state.clone(),
        tx,
        &signal_config(),
        CancellationToken::new(),
    )
    .unwrap();
    handle.join().unwrap();
    assert!(!state.insert_pending());
}

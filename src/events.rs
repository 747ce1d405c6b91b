use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Where an insert request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertSource {
    Coin,
    /// Operator "force insert" (SIGUSR1 or control socket).
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoothEvent {
    Insert(InsertSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BoothState {
    #[default]
    Idle = 0,
    InitialCountdown = 1,
    Capturing = 2,
    Presenting = 3,
}

impl BoothState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => BoothState::InitialCountdown,
            2 => BoothState::Capturing,
            3 => BoothState::Presenting,
            _ => BoothState::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BoothState::Idle => "idle",
            BoothState::InitialCountdown => "initial-countdown",
            BoothState::Capturing => "capturing",
            BoothState::Presenting => "presenting",
        }
    }
}

impl std::fmt::Display for BoothState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Booth state shared between the controller (sole writer) and the threads
/// that raise insert events (readers).
///
/// Besides the state itself the cell carries an insert latch. A producer may
/// only raise an insert after [`StateCell::try_claim_insert`] succeeds, and the
/// controller releases the latch once it has left `Idle` or dropped the event.
/// At most one insert is therefore in flight per idle period, whatever the
/// interleaving of polling and transitions.
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    inner: Arc<StateInner>,
}

#[derive(Debug, Default)]
struct StateInner {
    state: AtomicU8,
    insert_pending: AtomicBool,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> BoothState {
        BoothState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_idle(&self) -> bool {
        self.load() == BoothState::Idle
    }

    /// Only the session controller transitions state.
    pub(crate) fn store(&self, state: BoothState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    /// Returns true when the caller now owns the right to raise one insert.
    pub fn try_claim_insert(&self) -> bool {
        if !self.is_idle() {
            return false;
        }
        if self
            .inner
            .insert_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        // A transition may have landed between the state check and the latch.
        if !self.is_idle() {
            self.release_insert();
            return false;
        }
        true
    }

    pub fn insert_pending(&self) -> bool {
        self.inner.insert_pending.load(Ordering::Acquire)
    }

    /// Give the latch back, e.g. after the event was consumed or could not be delivered.
    pub fn release_insert(&self) {
        self.inner.insert_pending.store(false, Ordering::Release);
    }
}

//! The session state machine: Idle → InitialCountdown → Capturing → Presenting → Idle.
//!
//! Runs on one thread and owns the active [`Session`]. Time only advances
//! through the `now` passed to [`SessionController::handle_event`] and
//! [`SessionController::tick`], so the whole cycle can be driven from tests.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel::{Receiver, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SessionSettings;
use crate::display::{Display, SessionView};
use crate::events::{BoothEvent, BoothState, InsertSource, StateCell};
use crate::platform::gpio::SignalSource;
use crate::platform::storage::StorageProbe;
use crate::session::{Session, StorageTarget};
use crate::tasks::capture::CapturePipeline;
use crate::tasks::dispatcher::Finalizer;

const ONE_SECOND: Duration = Duration::from_secs(1);

/// Services the controller drives. Built once at startup.
pub struct Collaborators {
    pub signal: Arc<dyn SignalSource>,
    pub capture: CapturePipeline,
    pub storage: Box<dyn StorageProbe>,
    pub finalizer: Finalizer,
}

pub struct SessionController {
    settings: SessionSettings,
    state: StateCell,
    signal: Arc<dyn SignalSource>,
    capture: CapturePipeline,
    storage: Box<dyn StorageProbe>,
    finalizer: Finalizer,
    session: Option<Session>,
    next_second_at: Option<Instant>,
    presenting_until: Option<Instant>,
    indicator_off_at: Option<Instant>,
    workers: Vec<JoinHandle<Option<String>>>,
}

impl SessionController {
    pub fn new(settings: SessionSettings, state: StateCell, parts: Collaborators) -> Self {
        state.store(BoothState::Idle);
        Self {
            settings,
            state,
            signal: parts.signal,
            capture: parts.capture,
            storage: parts.storage,
            finalizer: parts.finalizer,
            session: None,
            next_second_at: None,
            presenting_until: None,
            indicator_off_at: None,
            workers: Vec::new(),
        }
    }

    pub fn state(&self) -> BoothState {
        self.state.load()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn handle_event(&mut self, event: BoothEvent, now: Instant) {
        match event {
            BoothEvent::Insert(source) => {
                if self.state() == BoothState::Idle {
                    self.start_session(source, now);
                } else {
                    debug!(?source, state = %self.state(), "insert ignored outside idle");
                }
                // Either the booth left Idle or the event was dropped.
                self.state.release_insert();
            }
        }
    }

    /// Advance timers. At most one countdown second elapses per call.
    pub fn tick(&mut self, now: Instant) {
        if let Some(off_at) = self.indicator_off_at
            && now >= off_at
        {
            self.indicator_off_at = None;
            self.set_indicator(false);
        }
        self.reap_workers();

        match self.state() {
            BoothState::Idle => {}
            BoothState::InitialCountdown | BoothState::Capturing => self.advance_countdown(now),
            BoothState::Presenting => {
                if self.presenting_until.is_some_and(|until| now >= until) {
                    self.end_presenting();
                }
            }
        }
    }

    pub fn view(&self) -> SessionView {
        let state = self.state();
        let Some(session) = &self.session else {
            return SessionView {
                state,
                total_shots: self.settings.total_shots,
                can_print: self.finalizer.can_print(),
                ..Default::default()
            };
        };
        let counting = matches!(state, BoothState::InitialCountdown | BoothState::Capturing);
        SessionView {
            state,
            session_id: Some(session.id().to_string()),
            countdown_remaining: counting.then(|| session.countdown_remaining()),
            shots: session.shots().iter().map(|shot| shot.display.clone()).collect(),
            total_shots: session.total_shots(),
            ephemeral: session.storage_target().is_ephemeral(),
            can_print: self.finalizer.can_print(),
        }
    }

    /// Drive the controller until cancelled or every event sender is gone.
    pub fn run(
        &mut self,
        events: &Receiver<BoothEvent>,
        display: &mut dyn Display,
        cancel: &CancellationToken,
    ) {
        let ticker = crossbeam_channel::tick(self.settings.tick_period());
        display.render(&self.view());
        while !cancel.is_cancelled() {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event, Instant::now()),
                    Err(_) => {
                        debug!("event channel closed; controller stopping");
                        break;
                    }
                },
                recv(ticker) -> _ => {
                    self.tick(Instant::now());
                    display.render(&self.view());
                }
            }
        }
        self.shutdown();
    }

    /// Switch the indicator off and wait for outstanding composite/print work.
    pub fn shutdown(&mut self) {
        self.indicator_off_at = None;
        self.set_indicator(false);
        for job_id in self.wait_for_finalizers().into_iter().flatten() {
            debug!(job_id = %job_id, "finalize worker finished");
        }
    }

    /// Join every finalize worker started so far. Returns their print job ids.
    pub fn wait_for_finalizers(&mut self) -> Vec<Option<String>> {
        std::mem::take(&mut self.workers)
            .into_iter()
            .filter_map(join_worker)
            .collect()
    }

    fn start_session(&mut self, source: InsertSource, now: Instant) {
        let target = StorageTarget::from_probe(self.storage.find_writable_removable_path());
        if target.is_ephemeral() {
            warn!("no writable storage; this session will not be saved or printed");
        }
        let session = Session::new(
            Session::id_for(Local::now()),
            target,
            self.settings.total_shots,
            self.settings.initial_countdown_seconds,
        );
        info!(
            session = session.id(),
            ?source,
            storage = ?session.storage_target().path(),
            "session started"
        );
        self.session = Some(session);
        self.next_second_at = Some(now + ONE_SECOND);
        self.transition(BoothState::InitialCountdown);
    }

    fn advance_countdown(&mut self, now: Instant) {
        let Some(due) = self.next_second_at else {
            return;
        };
        if now < due {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            warn!(state = %self.state(), "countdown without a session; returning to idle");
            self.reset_to_idle();
            return;
        };
        if session.countdown_remaining > 0 {
            session.countdown_remaining -= 1;
            debug!(session = session.id(), remaining = session.countdown_remaining, "countdown");
        }
        let remaining = session.countdown_remaining;
        // Every elapsed second pulses, including the one that triggers the capture.
        self.pulse_indicator(now);
        if remaining > 0 {
            self.next_second_at = Some(due + ONE_SECOND);
        } else {
            self.capture_next(now);
        }
    }

    fn capture_next(&mut self, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let index = session.next_index();
        let id = session.id().to_string();
        let result = self.capture.run_capture(session);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        match result {
            Ok(shot) => match session.push_shot(shot) {
                Ok(()) => info!(session = %id, shot = index, of = session.total_shots(), "shot captured"),
                Err(shot) => warn!(session = %id, shot = shot.index, "discarding unexpected shot"),
            },
            Err(err) => warn!(session = %id, shot = index, "capture failed, retrying: {err}"),
        }

        if session.is_complete() {
            self.begin_presenting(now);
            return;
        }
        session.countdown_remaining = self.settings.between_shots_seconds;
        self.next_second_at = Some(now + ONE_SECOND);
        if self.state() != BoothState::Capturing {
            self.transition(BoothState::Capturing);
        }
    }

    fn begin_presenting(&mut self, now: Instant) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let snapshot = session.finalize();
        let id = snapshot.id.clone();
        match self.finalizer.spawn(snapshot) {
            Ok(handle) => self.workers.push(handle),
            Err(err) => error!(session = %id, "failed to start finalize worker: {err}"),
        }
        self.next_second_at = None;
        self.presenting_until = Some(now + self.settings.presenting_duration());
        self.transition(BoothState::Presenting);
    }

    fn end_presenting(&mut self) {
        if let Some(session) = &self.session {
            info!(session = session.id(), "session finished");
        }
        self.reset_to_idle();
    }

    fn reset_to_idle(&mut self) {
        self.session = None;
        self.next_second_at = None;
        self.presenting_until = None;
        self.transition(BoothState::Idle);
    }

    fn transition(&mut self, to: BoothState) {
        let from = self.state();
        self.state.store(to);
        info!(from = %from, to = %to, "state changed");
    }

    fn pulse_indicator(&mut self, now: Instant) {
        self.set_indicator(true);
        self.indicator_off_at = Some(now + self.settings.indicator_pulse);
    }

    fn set_indicator(&self, on: bool) {
        if let Err(err) = self.signal.write_indicator(on) {
            debug!(on, "indicator write failed: {err}");
        }
    }

    fn reap_workers(&mut self) {
        if self.workers.iter().all(|handle| !handle.is_finished()) {
            return;
        }
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.workers)
            .into_iter()
            .partition(|handle| handle.is_finished());
        self.workers = pending;
        for handle in done {
            join_worker(handle);
        }
    }
}

fn join_worker(handle: JoinHandle<Option<String>>) -> Option<Option<String>> {
    match handle.join() {
        Ok(result) => Some(result),
        Err(_) => {
            error!("finalize worker panicked");
            None
        }
    }
}

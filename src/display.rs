//! What the booth shows. The kiosk screen itself is external; the shipped
//! implementation narrates the session through `tracing`.

use tracing::{debug, info};

use crate::events::BoothState;
use crate::session::DisplayHandle;

/// Everything a frame of the booth UI depends on.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    pub state: BoothState,
    pub session_id: Option<String>,
    /// Seconds until the next capture; `None` outside the countdown states.
    pub countdown_remaining: Option<u32>,
    pub shots: Vec<DisplayHandle>,
    pub total_shots: usize,
    pub ephemeral: bool,
    pub can_print: bool,
}

pub trait Display {
    fn render(&mut self, view: &SessionView);
}

/// Text shown above the countdown number.
pub fn countdown_prompt(seconds: u32) -> &'static str {
    match seconds {
        s if s > 3 => "look at the birdie",
        s if s > 1 => "smile",
        _ => "photo!",
    }
}

pub fn presenting_message(view: &SessionView) -> &'static str {
    if view.ephemeral {
        "no storage found: photos were not saved"
    } else if view.can_print {
        "printing your photos..."
    } else {
        "photos saved"
    }
}

#[derive(Debug, Default)]
pub struct LogDisplay {
    last_state: Option<BoothState>,
    last_countdown: Option<u32>,
    last_shots: usize,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Display for LogDisplay {
    fn render(&mut self, view: &SessionView) {
        let state_changed = self.last_state != Some(view.state);
        if state_changed {
            match view.state {
                BoothState::Idle => info!("insert coin"),
                BoothState::Presenting => info!(
                    shots = view.shots.len(),
                    "{}",
                    presenting_message(view)
                ),
                other => debug!(state = %other, "screen changed"),
            }
        }
        if view.shots.len() > self.last_shots
            && let Some(latest) = view.shots.last()
        {
            let (w, h) = latest.dimensions();
            info!(shot = view.shots.len(), of = view.total_shots, w, h, "showing shot");
        }
        if let Some(seconds) = view.countdown_remaining
            && (state_changed || self.last_countdown != Some(seconds))
        {
            info!(seconds, "{}", countdown_prompt(seconds));
        }
        self.last_state = Some(view.state);
        self.last_countdown = view.countdown_remaining;
        self.last_shots = view.shots.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_follow_remaining_seconds() {
        assert_eq!(countdown_prompt(5), "look at the birdie");
        assert_eq!(countdown_prompt(4), "look at the birdie");
        assert_eq!(countdown_prompt(3), "smile");
        assert_eq!(countdown_prompt(2), "smile");
        assert_eq!(countdown_prompt(1), "photo!");
        assert_eq!(countdown_prompt(0), "photo!");
    }

    #[test]
    fn presenting_message_reflects_storage_and_printer() {
        let mut view = SessionView {
            state: BoothState::Presenting,
            ephemeral: true,
            ..Default::default()
        };
        assert!(presenting_message(&view).contains("not saved"));
        view.ephemeral = false;
        view.can_print = true;
        assert_eq!(presenting_message(&view), "printing your photos...");
        view.can_print = false;
        assert_eq!(presenting_message(&view), "photos saved");
    }

    #[test]
    fn log_display_tracks_last_frame() {
        let mut display = LogDisplay::new();
        let view = SessionView {
            state: BoothState::InitialCountdown,
            countdown_remaining: Some(4),
            total_shots: 3,
            ..Default::default()
        };
        display.render(&view);
        assert_eq!(display.last_state, Some(BoothState::InitialCountdown));
        assert_eq!(display.last_countdown, Some(4));
        assert_eq!(display.last_shots, 0);
    }
}

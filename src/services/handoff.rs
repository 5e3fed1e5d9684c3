/// Ground-station handoff detection
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::domain::HandoffEvent;

/// Detector state. A handoff opens a fixed dwell window during which
/// the UI highlights the transition; further frames reporting the same
/// target do not reopen it.
#[derive(Debug, Clone)]
enum HandoffState {
    Steady(Option<String>),
    InProgress {
        to: String,
        until: Instant,
    },
}

/// Pure state machine over the active-station field. All time flows in
/// through the caller so the dwell window is deterministic under test.
#[derive(Debug)]
pub struct HandoffDetector {
    state: HandoffState,
    dwell: Duration,
    count: u64,
    last_event: Option<HandoffEvent>,
}

impl HandoffDetector {
    pub fn new(default_station: Option<String>, dwell: Duration) -> Self {
        Self {
            state: HandoffState::Steady(default_station),
            dwell,
            count: 0,
            last_event: None,
        }
    }

    /// Feed the active-station id from a freshly merged frame.
    pub fn observe(&mut self, new_id: Option<&str>, now: Instant) {
        self.settle(now);

        enum Action {
            Keep,
            Adopt(String),
            Drop,
            Begin { from: String, to: String },
        }

        let action = match (&self.state, new_id) {
            (HandoffState::Steady(Some(previous)), Some(new_id)) if previous != new_id => {
                Action::Begin {
                    from: previous.clone(),
                    to: new_id.to_string(),
                }
            }
            // no prior station: adopt without counting a handoff
            (HandoffState::Steady(None), Some(new_id)) => Action::Adopt(new_id.to_string()),
            (HandoffState::Steady(_), None) => Action::Drop,
            // a different target while still dwelling interrupts the
            // current handoff and starts a new one
            (HandoffState::InProgress { to, .. }, Some(new_id)) if to != new_id => {
                Action::Begin {
                    from: to.clone(),
                    to: new_id.to_string(),
                }
            }
            // same target while in progress: never double-count
            _ => Action::Keep,
        };

        match action {
            Action::Keep => {}
            Action::Adopt(id) => self.state = HandoffState::Steady(Some(id)),
            Action::Drop => self.state = HandoffState::Steady(None),
            Action::Begin { from, to } => self.begin(from, to, now),
        }
    }

    fn begin(&mut self, from: String, to: String, now: Instant) {
        self.count += 1;
        info!(%from, %to, "ground station handoff");
        self.last_event = Some(HandoffEvent {
            from_station: from,
            to_station: to.clone(),
            at: Utc::now(),
        });
        self.state = HandoffState::InProgress {
            to,
            until: now + self.dwell,
        };
    }

    /// Collapse an elapsed dwell window back to steady state.
    fn settle(&mut self, now: Instant) {
        let settled = match &self.state {
            HandoffState::InProgress { to, until } if now >= *until => Some(to.clone()),
            _ => None,
        };
        if let Some(to) = settled {
            self.state = HandoffState::Steady(Some(to));
        }
    }

    pub fn in_progress(&self, now: Instant) -> bool {
        matches!(&self.state, HandoffState::InProgress { until, .. } if now < *until)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn last_event(&self) -> Option<&HandoffEvent> {
        self.last_event.as_ref()
    }

    pub fn current_station(&self) -> Option<&str> {
        match &self.state {
            HandoffState::Steady(id) => id.as_deref(),
            HandoffState::InProgress { to, .. } => Some(to),
        }
    }
}

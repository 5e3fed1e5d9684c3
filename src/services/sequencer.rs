/// Protocol stack transmission animation sequencer
use serde::Serialize;
use std::time::{Duration, Instant};

use crate::domain::LinkDirection;

const BASE_LAYERS: [&str; 4] = ["APPLICATION", "TRANSPORT", "NETWORK", "PHYSICAL"];
const DTN_LAYERS: [&str; 5] = ["APPLICATION", "BUNDLE", "TRANSPORT", "NETWORK", "PHYSICAL"];

fn layers_for(direction: LinkDirection, dtn_mode: bool) -> Vec<&'static str> {
    let mut layers: Vec<&'static str> = if dtn_mode {
        DTN_LAYERS.to_vec()
    } else {
        BASE_LAYERS.to_vec()
    };
    if direction == LinkDirection::Downlink {
        layers.reverse();
    }
    layers
}

#[derive(Debug)]
enum SequencerState {
    Idle,
    Running {
        layers: Vec<&'static str>,
        index: usize,
        next_step: Instant,
    },
    Holding {
        layers: Vec<&'static str>,
        index: usize,
        until: Instant,
    },
}

/// Read-only projection for the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequencerView {
    pub layers: Vec<String>,
    pub active_index: Option<usize>,
    pub direction: Option<LinkDirection>,
    pub running: bool,
}

/// Deterministic, tick-driven walk over the protocol layers for one
/// simulated transmission. Driven by a single external ticker; no
/// nested timers, so cancellation and restart stay deterministic.
#[derive(Debug)]
pub struct StackSequencer {
    step: Duration,
    hold: Duration,
    state: SequencerState,
    direction: Option<LinkDirection>,
}

impl StackSequencer {
    pub fn new(step: Duration, hold: Duration) -> Self {
        Self {
            step,
            hold,
            state: SequencerState::Idle,
            direction: None,
        }
    }

    /// Start a walk. Re-triggering while running restarts from the new
    /// direction's first layer; last trigger wins.
    pub fn trigger(&mut self, direction: LinkDirection, dtn_mode: bool, now: Instant) {
        self.direction = Some(direction);
        self.state = SequencerState::Running {
            layers: layers_for(direction, dtn_mode),
            index: 0,
            next_step: now + self.step,
        };
    }

    /// Advance past any elapsed deadlines. A tick after teardown or
    /// while idle is a no-op.
    pub fn tick(&mut self, now: Instant) {
        loop {
            match std::mem::replace(&mut self.state, SequencerState::Idle) {
                SequencerState::Idle => return,
                SequencerState::Running {
                    layers,
                    index,
                    next_step,
                } => {
                    if now < next_step {
                        self.state = SequencerState::Running {
                            layers,
                            index,
                            next_step,
                        };
                        return;
                    }
                    if index + 1 < layers.len() {
                        self.state = SequencerState::Running {
                            layers,
                            index: index + 1,
                            next_step: next_step + self.step,
                        };
                    } else {
                        // terminal layer reached: hold briefly, then clear
                        self.state = SequencerState::Holding {
                            layers,
                            index,
                            until: next_step + self.hold,
                        };
                    }
                }
                SequencerState::Holding {
                    layers,
                    index,
                    until,
                } => {
                    if now < until {
                        self.state = SequencerState::Holding {
                            layers,
                            index,
                            until,
                        };
                        return;
                    }
                    // already replaced with Idle
                    self.direction = None;
                    return;
                }
            }
        }
    }

    pub fn view(&self) -> SequencerView {
        match &self.state {
            SequencerState::Idle => SequencerView {
                layers: Vec::new(),
                active_index: None,
                direction: None,
                running: false,
            },
            SequencerState::Running { layers, index, .. }
            | SequencerState::Holding { layers, index, .. } => SequencerView {
                layers: layers.iter().map(|l| l.to_string()).collect(),
                active_index: Some(*index),
                direction: self.direction,
                running: true,
            },
        }
    }

    pub fn active_layer(&self) -> Option<&'static str> {
        match &self.state {
            SequencerState::Idle => None,
            SequencerState::Running { layers, index, .. }
            | SequencerState::Holding { layers, index, .. } => layers.get(*index).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(200);
    const HOLD: Duration = Duration::from_millis(300);

    fn sequencer() -> StackSequencer {
        StackSequencer::new(STEP, HOLD)
    }

    #[test]
    fn uplink_walks_application_to_physical() {
        let mut seq = sequencer();
        let start = Instant::now();
        seq.trigger(LinkDirection::Uplink, false, start);
        assert_eq!(seq.active_layer(), Some("APPLICATION"));

        let mut walked = vec![seq.active_layer().unwrap()];
        for step in 1..4 {
            seq.tick(start + STEP * step);
            walked.push(seq.active_layer().unwrap());
        }
        assert_eq!(walked, BASE_LAYERS.to_vec());
    }

    #[test]
    fn downlink_walks_in_reverse_with_bundle_layer() {
        let mut seq = sequencer();
        let start = Instant::now();
        seq.trigger(LinkDirection::Downlink, true, start);
        assert_eq!(seq.active_layer(), Some("PHYSICAL"));
        seq.tick(start + STEP * 4);
        assert_eq!(seq.active_layer(), Some("APPLICATION"));
        assert_eq!(seq.view().layers.len(), 5);
    }

    #[test]
    fn holds_at_terminal_layer_then_clears() {
        let mut seq = sequencer();
        let start = Instant::now();
        seq.trigger(LinkDirection::Uplink, false, start);

        // walk to the terminal layer
        seq.tick(start + STEP * 3);
        assert_eq!(seq.active_layer(), Some("PHYSICAL"));

        // still held just before the hold deadline
        let terminal_at = start + STEP * 4;
        seq.tick(terminal_at + HOLD - Duration::from_millis(1));
        assert_eq!(seq.active_layer(), Some("PHYSICAL"));
        assert!(seq.view().running);

        seq.tick(terminal_at + HOLD);
        assert_eq!(seq.active_layer(), None);
        assert!(!seq.view().running);
    }

    #[test]
    fn retrigger_restarts_from_new_direction() {
        let mut seq = sequencer();
        let start = Instant::now();
        seq.trigger(LinkDirection::Uplink, false, start);
        seq.tick(start + STEP * 2);
        assert_eq!(seq.active_layer(), Some("NETWORK"));

        // last trigger wins; no queuing
        seq.trigger(LinkDirection::Downlink, false, start + STEP * 2);
        assert_eq!(seq.active_layer(), Some("PHYSICAL"));
        assert_eq!(seq.view().direction, Some(LinkDirection::Downlink));
    }

    #[test]
    fn tick_while_idle_is_a_noop() {
        let mut seq = sequencer();
        seq.tick(Instant::now());
        assert!(!seq.view().running);
        assert_eq!(seq.active_layer(), None);
    }
}

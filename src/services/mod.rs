/// Reconciliation engine: canonical state, merge logic, derived views
mod custody;
mod handoff;
mod sequencer;
mod throughput;

pub use custody::CustodyTracker;
pub use handoff::HandoffDetector;
pub use sequencer::{SequencerView, StackSequencer};
pub use throughput::{base_rates, estimate, ThroughputSample};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::buffers::RollingBuffer;
use crate::config::AppConfig;
use crate::domain::{
    DtnBundle, GroundStation, HandoffEvent, IssPosition, LinkBudgetSample, LinkDirection,
    LinkStatus, OrbitalUpdate, PathPoint, StreamFrame,
};
use crate::utils::uptime_percent;

/// Everything the engine mutates, behind one lock. All writes happen
/// inside frame-merge or timer-tick handlers; consumers only ever get
/// cloned value objects.
struct EngineState {
    connected: bool,
    last_error: Option<String>,
    last_timestamp: Option<DateTime<Utc>>,
    iss_position: Option<IssPosition>,
    orbital_path: Vec<PathPoint>,
    stations: Vec<GroundStation>,
    active_station_id: Option<String>,
    visible_stations_count: u32,
    min_elevation: f64,
    orbital_parameters: Value,
    link_status: Option<LinkStatus>,
    link_budget_history: Vec<LinkBudgetSample>,
    visibility: HashMap<String, RollingBuffer<bool>>,
    throughput: RollingBuffer<ThroughputSample>,
    handoff: HandoffDetector,
    custody: CustodyTracker,
    sequencer: StackSequencer,
}

/// Handoff projection for the read surface
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandoffView {
    pub count: u64,
    pub in_progress: bool,
    pub last_event: Option<HandoffEvent>,
}

/// Immutable snapshot of the canonical state, safe to hand to a
/// rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub connected: bool,
    pub last_error: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub iss_position: Option<IssPosition>,
    pub orbital_path: Vec<PathPoint>,
    pub stations: Vec<GroundStation>,
    pub active_station_id: Option<String>,
    pub visible_stations_count: u32,
    pub min_elevation: f64,
    pub orbital_parameters: Value,
    pub link_status: Option<LinkStatus>,
    pub link_budget: Vec<LinkBudgetSample>,
    pub handoff: HandoffView,
    pub dtn_queues: HashMap<String, Vec<DtnBundle>>,
    pub journeys: Vec<DtnBundle>,
    pub throughput: Vec<ThroughputSample>,
    pub sequencer: SequencerView,
    pub uptime_percent: HashMap<String, f64>,
}

/// The single source of truth all other components read. Only the merge
/// and tick methods mutate; every read hands out cloned values.
pub struct TelemetryEngine {
    state: RwLock<EngineState>,
    visibility_capacity: usize,
    link_budget_points: usize,
    journey_limit: usize,
}

impl TelemetryEngine {
    pub fn new(config: &AppConfig) -> Self {
        let state = EngineState {
            connected: false,
            last_error: None,
            last_timestamp: None,
            iss_position: None,
            orbital_path: Vec::new(),
            stations: Vec::new(),
            active_station_id: None,
            visible_stations_count: 0,
            min_elevation: 0.0,
            orbital_parameters: Value::Null,
            link_status: None,
            link_budget_history: Vec::new(),
            visibility: HashMap::new(),
            throughput: RollingBuffer::new(config.windows.throughput_samples),
            handoff: HandoffDetector::new(
                Some(config.default_station_id.clone()),
                Duration::from_millis(config.timings.handoff_dwell_ms),
            ),
            custody: CustodyTracker::new(),
            sequencer: StackSequencer::new(
                Duration::from_millis(config.timings.sequencer_tick_ms),
                Duration::from_millis(config.timings.sequencer_hold_ms),
            ),
        };
        Self {
            state: RwLock::new(state),
            visibility_capacity: config.windows.visibility_samples,
            link_budget_points: config.windows.link_budget_points,
            journey_limit: config.windows.journey_limit,
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge one inbound frame. `connection` and `heartbeat` frames are
    /// informational; `orbital_update` fully replaces the snapshot.
    pub fn merge_frame(&self, frame: StreamFrame) {
        match frame {
            StreamFrame::Connection { status, .. } => {
                info!(status = status.as_deref().unwrap_or("connected"), "stream greeting");
            }
            StreamFrame::Heartbeat { .. } => debug!("upstream heartbeat"),
            StreamFrame::OrbitalUpdate(update) => {
                self.apply_update(update, Utc::now(), Instant::now())
            }
        }
    }

    fn apply_update(&self, update: OrbitalUpdate, now: DateTime<Utc>, tick: Instant) {
        let mut guard = self.write();
        let state = &mut *guard;

        // a repeated timestamp is the same frame again: reapply the
        // (identical) data but skip the side effects, so duplicates
        // produce no observable change
        let duplicate = state.last_timestamp == Some(update.timestamp);

        // the station set is static: adopt it once, afterwards merge
        // only the telemetry fields of known stations
        if state.stations.is_empty() {
            state.stations = update.stations.clone();
        } else {
            for incoming in &update.stations {
                match state.stations.iter_mut().find(|s| s.id == incoming.id) {
                    Some(station) => {
                        station.is_active = incoming.is_active;
                        station.elevation = incoming.elevation;
                        station.next_pass_time = incoming.next_pass_time;
                        station.look_angles = incoming.look_angles.clone();
                    }
                    None => {
                        warn!(station = %incoming.id, "frame reported unknown station; ignored")
                    }
                }
            }
        }
        // at most one station is active, and it is the reported one
        for station in &mut state.stations {
            station.is_active = update.active_station_id.as_deref() == Some(station.id.as_str());
        }

        state.last_timestamp = Some(update.timestamp);
        state.iss_position = update.iss_position;
        state.orbital_path = update.orbital_path;
        state.visible_stations_count = update.visible_stations_count;
        state.min_elevation = update.min_elevation;
        state.orbital_parameters = update.orbital_parameters;
        state.link_status = update.link_status;
        state.link_budget_history = update.link_budget_history;
        state.active_station_id = update.active_station_id.clone();

        if !duplicate {
            state
                .handoff
                .observe(update.active_station_id.as_deref(), tick);

            for station in &state.stations {
                let visible = station
                    .look_angles
                    .as_ref()
                    .map(|l| l.is_visible)
                    .unwrap_or(station.elevation > 0.0);
                state
                    .visibility
                    .entry(station.id.clone())
                    .or_insert_with(|| RollingBuffer::new(self.visibility_capacity))
                    .push(visible);
            }
        }

        // the custody tracker is idempotent on its own
        state.custody.apply_queues(&update.dtn_queues, now);
        for ack in &update.custody_acks {
            if let Err(err) = state.custody.apply_ack(ack, now) {
                warn!(%err, "custody ack rejected");
            }
        }
        state.custody.expire_stale(now);
    }

    /// Sample the throughput estimator against the current link status.
    /// Called on a fixed cadence by the sampler task.
    pub fn sample_throughput(&self) {
        let mut state = self.write();
        let Some(link) = state.link_status.clone() else {
            return;
        };
        let (uplink_mbps, downlink_mbps) = estimate(link.connection_state, link.snr_db);
        state.throughput.push(ThroughputSample {
            at: Utc::now(),
            uplink_mbps,
            downlink_mbps,
        });
    }

    pub fn trigger_transmission(&self, direction: LinkDirection, dtn_mode: bool) {
        info!(?direction, dtn_mode, "transmission triggered");
        self.write()
            .sequencer
            .trigger(direction, dtn_mode, Instant::now());
    }

    pub fn tick_sequencer(&self) {
        self.write().sequencer.tick(Instant::now());
    }

    /// Record a bundle returned by a successful create-bundle command.
    pub fn record_created_bundle(&self, bundle: DtnBundle) {
        self.write().custody.record_created(bundle, Utc::now());
    }

    pub fn set_connected(&self, connected: bool) {
        let mut state = self.write();
        state.connected = connected;
        if connected {
            state.last_error = None;
        }
    }

    pub fn set_error(&self, message: String) {
        self.write().last_error = Some(message);
    }

    pub fn is_connected(&self) -> bool {
        self.read().connected
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot_at(Utc::now(), Instant::now())
    }

    fn snapshot_at(&self, now: DateTime<Utc>, tick: Instant) -> EngineSnapshot {
        let state = self.read();
        EngineSnapshot {
            connected: state.connected,
            last_error: state.last_error.clone(),
            timestamp: state.last_timestamp,
            iss_position: state.iss_position,
            orbital_path: state.orbital_path.clone(),
            stations: state.stations.clone(),
            active_station_id: state.active_station_id.clone(),
            visible_stations_count: state.visible_stations_count,
            min_elevation: state.min_elevation,
            orbital_parameters: state.orbital_parameters.clone(),
            link_status: state.link_status.clone(),
            link_budget: window(&state.link_budget_history, self.link_budget_points),
            handoff: HandoffView {
                count: state.handoff.count(),
                in_progress: state.handoff.in_progress(tick),
                last_event: state.handoff.last_event().cloned(),
            },
            dtn_queues: state.custody.queues_by_station(now),
            journeys: state.custody.journeys(self.journey_limit, now),
            throughput: state.throughput.snapshot(),
            sequencer: state.sequencer.view(),
            uptime_percent: state
                .stations
                .iter()
                .map(|s| {
                    let history = state
                        .visibility
                        .get(&s.id)
                        .map(|b| b.snapshot())
                        .unwrap_or_default();
                    (
                        s.id.clone(),
                        uptime_percent(&history, self.visibility_capacity),
                    )
                })
                .collect(),
        }
    }

    pub fn handoff_view(&self) -> HandoffView {
        let state = self.read();
        HandoffView {
            count: state.handoff.count(),
            in_progress: state.handoff.in_progress(Instant::now()),
            last_event: state.handoff.last_event().cloned(),
        }
    }

    pub fn journeys(&self) -> Vec<DtnBundle> {
        self.read().custody.journeys(self.journey_limit, Utc::now())
    }

    pub fn station_queue(&self, station_id: &str) -> Option<Vec<DtnBundle>> {
        let state = self.read();
        if !state.stations.iter().any(|s| s.id == station_id) {
            return None;
        }
        Some(state.custody.station_queue(station_id, Utc::now()))
    }

    pub fn station_uptime(&self, station_id: &str) -> Option<f64> {
        let state = self.read();
        if !state.stations.iter().any(|s| s.id == station_id) {
            return None;
        }
        let history = state
            .visibility
            .get(station_id)
            .map(|b| b.snapshot())
            .unwrap_or_default();
        Some(uptime_percent(&history, self.visibility_capacity))
    }

    pub fn throughput_history(&self) -> Vec<ThroughputSample> {
        self.read().throughput.snapshot()
    }

    pub fn link_budget_window(&self) -> Vec<LinkBudgetSample> {
        window(&self.read().link_budget_history, self.link_budget_points)
    }

    pub fn sequencer_view(&self) -> SequencerView {
        self.read().sequencer.view()
    }
}

/// The most recent `points` entries of an upstream-provided history
fn window<T: Clone>(history: &[T], points: usize) -> Vec<T> {
    let start = history.len().saturating_sub(points);
    history[start..].to_vec()
}

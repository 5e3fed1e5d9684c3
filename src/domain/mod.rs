/// Domain models for the telemetry reconciliation engine
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Link connection state reported by the upstream link-budget model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Acquired,
    Degraded,
    Idle,
}

/// Instantaneous RF link quality; replaced wholesale on every frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub signal_strength_dbm: f64,
    pub connection_state: ConnectionState,
    pub latency_ms: f64,
    pub doppler_shift_khz: f64,
    pub snr_db: f64,
    pub range_km: f64,
    #[serde(default)]
    pub elevation_deg: f64,
    #[serde(default)]
    pub fspl_db: f64,
    #[serde(default)]
    pub atmospheric_loss_db: f64,
    #[serde(default)]
    pub noise_floor_dbm: f64,
}

/// Look angles supplied by the upstream orbital-mechanics source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookAngles {
    pub azimuth: f64,
    pub elevation: f64,
    pub range_km: f64,
    pub is_visible: bool,
}

/// A known ground station. The set is static; merging only refreshes
/// the telemetry fields (`is_active`, `elevation`, pass prediction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundStation {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub next_pass_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub look_angles: Option<LookAngles>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundlePriority {
    Expedited,
    Normal,
    Bulk,
}

impl BundlePriority {
    /// Sort rank: expedited bundles drain first
    pub fn rank(self) -> u8 {
        match self {
            BundlePriority::Expedited => 0,
            BundlePriority::Normal => 1,
            BundlePriority::Bulk => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BundleStatus {
    Queued,
    Transmitting,
    Delivered,
    Forwarded,
    Expired,
}

impl BundleStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BundleStatus::Delivered | BundleStatus::Expired)
    }

    /// Lifecycle table. Reapplying the current status is always allowed
    /// (full-replace frames arrive repeatedly); terminal states accept
    /// nothing else.
    pub fn can_transition_to(self, next: BundleStatus) -> bool {
        use BundleStatus::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Queued, Transmitting)
                | (Queued, Expired)
                | (Transmitting, Delivered)
                | (Transmitting, Forwarded)
                | (Transmitting, Expired)
                | (Forwarded, Transmitting)
                | (Forwarded, Expired)
        )
    }
}

/// A store-and-forward DTN bundle. Identity is `bundle_id`; lifecycle is
/// governed by [`BundleStatus::can_transition_to`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtnBundle {
    pub bundle_id: String,
    #[serde(default)]
    pub bundle_id_short: String,
    pub source_station: String,
    pub destination_station: String,
    pub payload: String,
    pub priority: BundlePriority,
    pub status: BundleStatus,
    pub created_at: DateTime<Utc>,
    pub ttl_hours: i64,
    #[serde(default)]
    pub current_custodian: String,
    #[serde(default)]
    pub forwarded_to: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hops: Vec<String>,
    /// Derived; recomputed against current time on every read
    #[serde(default)]
    pub age_seconds: f64,
}

impl DtnBundle {
    pub fn short_id(bundle_id: &str) -> String {
        bundle_id.chars().take(8).collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > chrono::Duration::hours(self.ttl_hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckType {
    CustodyAccepted,
    Delivered,
}

/// Ephemeral custody-transfer event; consumed once, never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyAck {
    pub bundle_id: String,
    #[serde(default)]
    pub bundle_id_short: String,
    pub from_station: String,
    pub to_station: String,
    pub ack_type: AckType,
    pub timestamp: DateTime<Utc>,
}

/// Derived locally when the active station changes between merged frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffEvent {
    pub from_station: String,
    pub to_station: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IssPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    pub velocity_kmps: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

/// One upstream SNR sample for the link-budget chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkBudgetSample {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub snr_db: f64,
}

/// Full network snapshot carried by an `orbital_update` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrbitalUpdate {
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub iss_position: Option<IssPosition>,
    #[serde(default)]
    pub orbital_path: Vec<PathPoint>,
    #[serde(default)]
    pub stations: Vec<GroundStation>,
    #[serde(default)]
    pub active_station_id: Option<String>,
    #[serde(default)]
    pub visible_stations_count: u32,
    #[serde(default)]
    pub min_elevation: f64,
    #[serde(default)]
    pub orbital_parameters: Value,
    #[serde(default)]
    pub link_status: Option<LinkStatus>,
    #[serde(default)]
    pub link_budget_history: Vec<LinkBudgetSample>,
    #[serde(default)]
    pub dtn_queues: HashMap<String, Vec<DtnBundle>>,
    #[serde(default)]
    pub custody_acks: Vec<CustodyAck>,
}

/// Closed union of inbound stream frames. Anything outside the union is
/// rejected at the boundary rather than coerced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    /// One-time greeting after the socket opens; informational only
    Connection {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    /// Upstream keepalive; informational only
    Heartbeat {
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    OrbitalUpdate(OrbitalUpdate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDirection {
    Uplink,
    Downlink,
}

/// Outbound "create bundle" command payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBundleRequest {
    pub source_station: String,
    pub destination: String,
    pub payload: String,
    pub priority: BundlePriority,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBundleResponse {
    pub success: bool,
    #[serde(default)]
    pub bundle: Option<DtnBundle>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Trigger payload for the protocol stack sequencer
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransmitRequest {
    pub direction: LinkDirection,
    #[serde(default)]
    pub dtn_mode: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}

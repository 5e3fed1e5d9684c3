/// Application configuration module
use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub telemetry_ws_url: String,
    pub command_api_url: String,
    pub default_station_id: String,
    pub timings: EngineTimings,
    pub windows: BufferWindows,
}

/// Timer cadences, all in milliseconds
#[derive(Clone, Debug)]
pub struct EngineTimings {
    pub reconnect_delay_ms: u64,
    pub handoff_dwell_ms: u64,
    pub throughput_sample_ms: u64,
    pub sequencer_tick_ms: u64,
    pub sequencer_hold_ms: u64,
}

/// Rolling-window capacities for the chart buffers
#[derive(Clone, Debug)]
pub struct BufferWindows {
    pub visibility_samples: usize,
    pub throughput_samples: usize,
    pub link_budget_points: usize,
    pub journey_limit: usize,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr =
            env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let telemetry_ws_url = env::var("TELEMETRY_WS_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:8000/ws".to_string());

        let command_api_url = env::var("COMMAND_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());

        let default_station_id =
            env::var("DEFAULT_STATION_ID").unwrap_or_else(|_| "toronto".to_string());

        let timings = EngineTimings {
            reconnect_delay_ms: env_u64("RECONNECT_DELAY_MS", 3000),
            handoff_dwell_ms: env_u64("HANDOFF_DWELL_MS", 1800),
            throughput_sample_ms: env_u64("THROUGHPUT_EVERY_MS", 1500),
            sequencer_tick_ms: env_u64("SEQUENCER_TICK_MS", 200),
            sequencer_hold_ms: env_u64("SEQUENCER_HOLD_MS", 300),
        };

        let windows = BufferWindows {
            visibility_samples: env_usize("VISIBILITY_SAMPLES", 1800), // 30 min at 1 Hz
            throughput_samples: env_usize("THROUGHPUT_SAMPLES", 13),   // ~20 s at 1.5 s
            link_budget_points: env_usize("LINK_BUDGET_POINTS", 60),
            journey_limit: env_usize("JOURNEY_LIMIT", 10),
        };

        Ok(Self {
            listen_addr,
            telemetry_ws_url,
            command_api_url,
            default_station_id,
            timings,
            windows,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

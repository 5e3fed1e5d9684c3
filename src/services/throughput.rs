/// Link-quality-to-throughput estimation
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

use crate::domain::ConnectionState;

/// One sampled uplink/downlink rate pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThroughputSample {
    pub at: DateTime<Utc>,
    pub uplink_mbps: f64,
    pub downlink_mbps: f64,
}

/// Jitter-free rates in Mbps for a given link state and SNR. Monotone
/// non-decreasing in SNR for a fixed state.
pub fn base_rates(state: ConnectionState, snr_db: f64) -> (f64, f64) {
    match state {
        ConnectionState::Idle => (0.0, 0.0),
        ConnectionState::Acquired => {
            let factor = ((snr_db - 10.0) / 30.0).clamp(0.0, 1.0);
            (1.2 + factor * 8.8, 3.0 + factor * 22.0)
        }
        ConnectionState::Degraded => {
            let factor = ((snr_db - 3.0) / 7.0).clamp(0.0, 1.0);
            (0.3 + factor * 0.9, 0.8 + factor * 2.2)
        }
    }
}

/// Simulated instantaneous rates: base rates plus bounded uniform
/// jitter, regenerated per sample and never persisted. Idle is exactly
/// zero with no jitter.
pub fn estimate(state: ConnectionState, snr_db: f64) -> (f64, f64) {
    if state == ConnectionState::Idle {
        return (0.0, 0.0);
    }
    let (up_jitter, down_jitter) = match state {
        ConnectionState::Acquired => (0.25, 0.75),
        ConnectionState::Degraded => (0.15, 0.4),
        ConnectionState::Idle => unreachable!(),
    };
    let (up, down) = base_rates(state, snr_db);
    let mut rng = rand::thread_rng();
    let up = up + rng.gen_range(-up_jitter..=up_jitter);
    let down = down + rng.gen_range(-down_jitter..=down_jitter);
    (up.max(0.0), down.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_is_exactly_zero_for_any_snr() {
        for snr in [-50.0, 0.0, 3.0, 25.0, 1000.0] {
            assert_eq!(estimate(ConnectionState::Idle, snr), (0.0, 0.0));
        }
    }

    #[test]
    fn acquired_mid_snr_lands_in_the_jitter_band() {
        // snr 25 -> factor 0.5 -> base (5.6, 14.0)
        for _ in 0..200 {
            let (up, down) = estimate(ConnectionState::Acquired, 25.0);
            assert!((5.35..=5.85).contains(&up), "uplink {up} out of band");
            assert!((13.25..=14.75).contains(&down), "downlink {down} out of band");
        }
    }

    #[test]
    fn degraded_rates_stay_in_band() {
        // snr 6.5 -> factor 0.5 -> base (0.75, 1.9)
        for _ in 0..200 {
            let (up, down) = estimate(ConnectionState::Degraded, 6.5);
            assert!((0.6..=0.9).contains(&up), "uplink {up} out of band");
            assert!((1.5..=2.3).contains(&down), "downlink {down} out of band");
        }
    }

    #[test]
    fn factor_saturates_at_the_band_edges() {
        assert_eq!(base_rates(ConnectionState::Acquired, 10.0), (1.2, 3.0));
        assert_eq!(base_rates(ConnectionState::Acquired, 40.0), (10.0, 25.0));
        assert_eq!(base_rates(ConnectionState::Acquired, 400.0), (10.0, 25.0));
        assert_eq!(base_rates(ConnectionState::Degraded, 3.0), (0.3, 0.8));
        assert_eq!(base_rates(ConnectionState::Degraded, 10.0), (1.2, 3.0));
    }

    #[test]
    fn base_rates_monotone_in_snr() {
        for state in [ConnectionState::Acquired, ConnectionState::Degraded] {
            let mut prev = base_rates(state, -10.0);
            let mut snr = -10.0;
            while snr <= 50.0 {
                let next = base_rates(state, snr);
                assert!(next.0 >= prev.0 && next.1 >= prev.1);
                prev = next;
                snr += 0.5;
            }
        }
    }

    #[test]
    fn outputs_never_negative() {
        for _ in 0..200 {
            let (up, down) = estimate(ConnectionState::Degraded, -100.0);
            assert!(up >= 0.0 && down >= 0.0);
        }
    }
}

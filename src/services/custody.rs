/// DTN bundle custody tracking across per-station queues
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::domain::{AckType, BundleStatus, CustodyAck, DtnBundle};
use crate::errors::EngineError;

/// Tracks every bundle's lifecycle from creation until terminal status.
/// Terminal bundles are never deleted; rendering retention is the
/// consumer's concern. All transitions are validated against
/// [`BundleStatus::can_transition_to`]; a rejected transition is a
/// data-integrity fault that leaves prior state intact.
#[derive(Debug, Default)]
pub struct CustodyTracker {
    bundles: HashMap<String, DtnBundle>,
}

impl CustodyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the full per-station queue state carried by a frame. The
    /// frames are complete snapshots, so reapplying one is a no-op.
    pub fn apply_queues(
        &mut self,
        queues: &HashMap<String, Vec<DtnBundle>>,
        now: DateTime<Utc>,
    ) {
        for (station_id, queue) in queues {
            for incoming in queue {
                if let Err(err) = self.apply_bundle(station_id, incoming, now) {
                    warn!(%err, "data-integrity fault; keeping prior state");
                }
            }
        }
    }

    fn apply_bundle(
        &mut self,
        station_id: &str,
        incoming: &DtnBundle,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        match self.bundles.get_mut(&incoming.bundle_id) {
            None => {
                let mut bundle = incoming.clone();
                if bundle.bundle_id_short.is_empty() {
                    bundle.bundle_id_short = DtnBundle::short_id(&bundle.bundle_id);
                }
                if bundle.current_custodian.is_empty() {
                    bundle.current_custodian = station_id.to_string();
                }
                if bundle.hops.is_empty() {
                    bundle.hops.push(bundle.source_station.clone());
                }
                let custodian = bundle.current_custodian.clone();
                append_hop(&mut bundle.hops, &custodian);
                bundle.age_seconds = age_seconds(bundle.created_at, now);
                debug!(bundle_id = %bundle.bundle_id_short, station = %station_id, "tracking new bundle");
                self.bundles.insert(bundle.bundle_id.clone(), bundle);
            }
            Some(existing) => {
                if !existing.status.can_transition_to(incoming.status) {
                    existing.age_seconds = age_seconds(existing.created_at, now);
                    return Err(EngineError::InvalidTransition {
                        bundle_id: existing.bundle_id.clone(),
                        from: existing.status,
                        to: incoming.status,
                    });
                }

                existing.status = incoming.status;
                if !incoming.status.is_terminal() && !incoming.current_custodian.is_empty() {
                    existing.current_custodian = incoming.current_custodian.clone();
                }
                existing.forwarded_to = incoming.forwarded_to.clone();
                if incoming.status == BundleStatus::Delivered && existing.delivered_at.is_none() {
                    existing.delivered_at = incoming.delivered_at.or(Some(now));
                }
                // hops are append-only: take new entries in frame order,
                // never reorder or truncate what we already recorded
                for hop in &incoming.hops {
                    append_hop(&mut existing.hops, hop);
                }
                let custodian = existing.current_custodian.clone();
                append_hop(&mut existing.hops, &custodian);
                existing.age_seconds = age_seconds(existing.created_at, now);
            }
        }
        Ok(())
    }

    /// Apply a custody acknowledgment. `custody_accepted` moves the
    /// bundle to transmitting at the new custodian when a full-state
    /// frame has not already said so; `delivered` is the terminal edge.
    pub fn apply_ack(&mut self, ack: &CustodyAck, now: DateTime<Utc>) -> Result<(), EngineError> {
        let Some(bundle) = self.bundles.get_mut(&ack.bundle_id) else {
            return Err(EngineError::UnknownBundle(ack.bundle_id.clone()));
        };
        bundle.age_seconds = age_seconds(bundle.created_at, now);

        match ack.ack_type {
            AckType::CustodyAccepted => match bundle.status {
                BundleStatus::Queued | BundleStatus::Forwarded => {
                    bundle.status = BundleStatus::Transmitting;
                    bundle.current_custodian = ack.to_station.clone();
                    append_hop(&mut bundle.hops, &ack.to_station);
                    info!(
                        bundle_id = %bundle.bundle_id_short,
                        from = %ack.from_station,
                        to = %ack.to_station,
                        "custody accepted"
                    );
                    Ok(())
                }
                // already reflected by a full-state frame
                BundleStatus::Transmitting if bundle.current_custodian == ack.to_station => Ok(()),
                from => Err(EngineError::InvalidTransition {
                    bundle_id: bundle.bundle_id.clone(),
                    from,
                    to: BundleStatus::Transmitting,
                }),
            },
            AckType::Delivered => match bundle.status {
                BundleStatus::Transmitting => {
                    bundle.status = BundleStatus::Delivered;
                    bundle.delivered_at = Some(ack.timestamp);
                    append_hop(&mut bundle.hops, &ack.to_station);
                    info!(bundle_id = %bundle.bundle_id_short, to = %ack.to_station, "bundle delivered");
                    Ok(())
                }
                BundleStatus::Delivered => Ok(()),
                from => Err(EngineError::InvalidTransition {
                    bundle_id: bundle.bundle_id.clone(),
                    from,
                    to: BundleStatus::Delivered,
                }),
            },
        }
    }

    /// Insert a bundle returned by a create-bundle command, unless the
    /// stream already reported it.
    pub fn record_created(&mut self, bundle: DtnBundle, now: DateTime<Utc>) {
        if self.bundles.contains_key(&bundle.bundle_id) {
            return;
        }
        let mut bundle = bundle;
        if bundle.bundle_id_short.is_empty() {
            bundle.bundle_id_short = DtnBundle::short_id(&bundle.bundle_id);
        }
        if bundle.current_custodian.is_empty() {
            bundle.current_custodian = bundle.source_station.clone();
        }
        if bundle.hops.is_empty() {
            bundle.hops.push(bundle.source_station.clone());
        }
        bundle.age_seconds = age_seconds(bundle.created_at, now);
        info!(bundle_id = %bundle.bundle_id_short, source = %bundle.source_station, "bundle created");
        self.bundles.insert(bundle.bundle_id.clone(), bundle);
    }

    /// Expire non-terminal bundles whose TTL has elapsed.
    pub fn expire_stale(&mut self, now: DateTime<Utc>) {
        for bundle in self.bundles.values_mut() {
            if !bundle.status.is_terminal() && bundle.is_expired(now) {
                info!(bundle_id = %bundle.bundle_id_short, "bundle expired (TTL exceeded)");
                bundle.status = BundleStatus::Expired;
            }
        }
    }

    /// Bundles currently custodied by a station, expired ones filtered,
    /// expedited first.
    pub fn station_queue(&self, station_id: &str, now: DateTime<Utc>) -> Vec<DtnBundle> {
        let mut queue: Vec<DtnBundle> = self
            .bundles
            .values()
            .filter(|b| b.current_custodian == station_id && !b.status.is_terminal())
            .filter(|b| !b.is_expired(now))
            .map(|b| with_recomputed_age(b, now))
            .collect();
        queue.sort_by_key(|b| (b.priority.rank(), b.created_at));
        queue
    }

    /// Journey projection: the most recent `limit` bundles that are
    /// terminal or have made at least one transfer, newest first.
    /// Recomputed from raw bundle state on every read.
    pub fn journeys(&self, limit: usize, now: DateTime<Utc>) -> Vec<DtnBundle> {
        let mut journeys: Vec<DtnBundle> = self
            .bundles
            .values()
            .filter(|b| b.status.is_terminal() || b.hops.len() > 1)
            .map(|b| with_recomputed_age(b, now))
            .collect();
        journeys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        journeys.truncate(limit);
        journeys
    }

    /// All tracked bundles grouped by current custodian, ages recomputed.
    pub fn queues_by_station(&self, now: DateTime<Utc>) -> HashMap<String, Vec<DtnBundle>> {
        let mut queues: HashMap<String, Vec<DtnBundle>> = HashMap::new();
        for bundle in self.bundles.values() {
            if bundle.status.is_terminal() {
                continue;
            }
            queues
                .entry(bundle.current_custodian.clone())
                .or_default()
                .push(with_recomputed_age(bundle, now));
        }
        for queue in queues.values_mut() {
            queue.sort_by_key(|b| (b.priority.rank(), b.created_at));
        }
        queues
    }

    pub fn get(&self, bundle_id: &str) -> Option<&DtnBundle> {
        self.bundles.get(bundle_id)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

fn append_hop(hops: &mut Vec<String>, station: &str) {
    if !station.is_empty() && !hops.iter().any(|h| h == station) {
        hops.push(station.to_string());
    }
}

fn age_seconds(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    ((now - created_at).num_milliseconds() as f64 / 1000.0).max(0.0)
}

fn with_recomputed_age(bundle: &DtnBundle, now: DateTime<Utc>) -> DtnBundle {
    let mut bundle = bundle.clone();
    bundle.age_seconds = age_seconds(bundle.created_at, now);
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BundlePriority;

    fn bundle(id: &str, status: BundleStatus, custodian: &str) -> DtnBundle {
        DtnBundle {
            bundle_id: id.to_string(),
            bundle_id_short: DtnBundle::short_id(id),
            source_station: "toronto".to_string(),
            destination_station: "ISS".to_string(),
            payload: "ping".to_string(),
            priority: BundlePriority::Normal,
            status,
            created_at: Utc::now(),
            ttl_hours: 24,
            current_custodian: custodian.to_string(),
            forwarded_to: None,
            delivered_at: None,
            hops: vec!["toronto".to_string()],
            age_seconds: 0.0,
        }
    }

    fn ack(id: &str, ack_type: AckType, from: &str, to: &str) -> CustodyAck {
        CustodyAck {
            bundle_id: id.to_string(),
            bundle_id_short: DtnBundle::short_id(id),
            from_station: from.to_string(),
            to_station: to.to_string(),
            ack_type,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn end_to_end_bundle_journey() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();

        tracker.record_created(bundle("bundle-0001", BundleStatus::Queued, ""), now);
        let tracked = tracker.get("bundle-0001").unwrap();
        assert_eq!(tracked.status, BundleStatus::Queued);
        assert_eq!(tracked.hops, vec!["toronto"]);
        assert_eq!(tracked.current_custodian, "toronto");

        tracker
            .apply_ack(
                &ack("bundle-0001", AckType::CustodyAccepted, "toronto", "london"),
                now,
            )
            .unwrap();
        let tracked = tracker.get("bundle-0001").unwrap();
        assert_eq!(tracked.status, BundleStatus::Transmitting);
        assert_eq!(tracked.hops, vec!["toronto", "london"]);
        assert_eq!(tracked.current_custodian, "london");

        tracker
            .apply_ack(&ack("bundle-0001", AckType::Delivered, "london", "ISS"), now)
            .unwrap();
        let tracked = tracker.get("bundle-0001").unwrap();
        assert_eq!(tracked.status, BundleStatus::Delivered);
        assert!(tracked.delivered_at.is_some());

        // terminal: nothing moves it again
        let err = tracker
            .apply_ack(
                &ack("bundle-0001", AckType::CustodyAccepted, "ISS", "svalbard"),
                now,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        assert_eq!(
            tracker.get("bundle-0001").unwrap().status,
            BundleStatus::Delivered
        );
    }

    #[test]
    fn invalid_transition_keeps_prior_state() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();
        tracker.record_created(bundle("b-2", BundleStatus::Queued, "toronto"), now);

        let mut frame_bundle = bundle("b-2", BundleStatus::Delivered, "toronto");
        frame_bundle.created_at = tracker.get("b-2").unwrap().created_at;
        let queues = HashMap::from([("toronto".to_string(), vec![frame_bundle])]);
        tracker.apply_queues(&queues, now);

        // QUEUED -> DELIVERED skips transmit and is rejected
        assert_eq!(tracker.get("b-2").unwrap().status, BundleStatus::Queued);
    }

    #[test]
    fn delivered_to_queued_is_a_noop() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();
        let mut delivered = bundle("b-3", BundleStatus::Delivered, "london");
        delivered.delivered_at = Some(now);
        tracker.record_created(delivered, now);

        let requeued = {
            let mut b = bundle("b-3", BundleStatus::Queued, "london");
            b.created_at = tracker.get("b-3").unwrap().created_at;
            b
        };
        let queues = HashMap::from([("london".to_string(), vec![requeued])]);
        tracker.apply_queues(&queues, now);
        assert_eq!(tracker.get("b-3").unwrap().status, BundleStatus::Delivered);
    }

    #[test]
    fn reapplying_a_frame_is_idempotent() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();
        let queues = HashMap::from([(
            "toronto".to_string(),
            vec![bundle("b-4", BundleStatus::Queued, "toronto")],
        )]);
        tracker.apply_queues(&queues, now);
        let first = tracker.get("b-4").unwrap().clone();
        tracker.apply_queues(&queues, now);
        assert_eq!(tracker.get("b-4").unwrap(), &first);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn hops_append_exactly_once() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();
        tracker.record_created(bundle("b-5", BundleStatus::Queued, "toronto"), now);
        for _ in 0..3 {
            tracker
                .apply_ack(&ack("b-5", AckType::CustodyAccepted, "toronto", "london"), now)
                .unwrap();
        }
        assert_eq!(tracker.get("b-5").unwrap().hops, vec!["toronto", "london"]);
    }

    #[test]
    fn ttl_expiry_is_terminal() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();
        let mut stale = bundle("b-6", BundleStatus::Queued, "toronto");
        stale.created_at = now - chrono::Duration::hours(25);
        tracker.record_created(stale, now);

        tracker.expire_stale(now);
        assert_eq!(tracker.get("b-6").unwrap().status, BundleStatus::Expired);

        // expired is terminal: an ack cannot revive it
        assert!(tracker
            .apply_ack(&ack("b-6", AckType::CustodyAccepted, "toronto", "london"), now)
            .is_err());
        assert_eq!(tracker.get("b-6").unwrap().status, BundleStatus::Expired);
    }

    #[test]
    fn station_queue_sorts_expedited_first() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();
        let mut bulk = bundle("b-bulk", BundleStatus::Queued, "toronto");
        bulk.priority = BundlePriority::Bulk;
        let mut expedited = bundle("b-exp", BundleStatus::Queued, "toronto");
        expedited.priority = BundlePriority::Expedited;
        tracker.record_created(bulk, now);
        tracker.record_created(expedited, now);
        tracker.record_created(bundle("b-norm", BundleStatus::Queued, "toronto"), now);

        let queue = tracker.station_queue("toronto", now);
        let ids: Vec<&str> = queue.iter().map(|b| b.bundle_id.as_str()).collect();
        assert_eq!(ids, vec!["b-exp", "b-norm", "b-bulk"]);
    }

    #[test]
    fn journeys_newest_first_with_transfers_or_terminal() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();

        // queued at its source, never moved: not a journey
        tracker.record_created(bundle("b-still", BundleStatus::Queued, "toronto"), now);

        let mut moved = bundle("b-moved", BundleStatus::Queued, "toronto");
        moved.created_at = now - chrono::Duration::seconds(30);
        tracker.record_created(moved, now);
        tracker
            .apply_ack(&ack("b-moved", AckType::CustodyAccepted, "toronto", "london"), now)
            .unwrap();

        let mut done = bundle("b-done", BundleStatus::Delivered, "london");
        done.created_at = now - chrono::Duration::seconds(10);
        tracker.record_created(done, now);

        let journeys = tracker.journeys(10, now);
        let ids: Vec<&str> = journeys.iter().map(|b| b.bundle_id.as_str()).collect();
        assert_eq!(ids, vec!["b-done", "b-moved"]);

        assert_eq!(tracker.journeys(1, now).len(), 1);
    }

    #[test]
    fn ages_are_recomputed_not_trusted() {
        let mut tracker = CustodyTracker::new();
        let now = Utc::now();
        let mut lying = bundle("b-age", BundleStatus::Queued, "toronto");
        lying.created_at = now - chrono::Duration::seconds(42);
        lying.age_seconds = 99999.0;
        let queues = HashMap::from([("toronto".to_string(), vec![lying])]);
        tracker.apply_queues(&queues, now);

        let age = tracker.get("b-age").unwrap().age_seconds;
        assert!((age - 42.0).abs() < 0.5);
        assert!(age >= 0.0);
    }
}

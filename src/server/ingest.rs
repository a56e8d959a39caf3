use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use utoipa::ToSchema;

use crate::config::IngestConfig;
use crate::geo::{distance_meters, Coordinate};

const SHARD_COUNT: usize = 16;

/// Last accepted position for one device. Lives for the server process.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeviceRecord {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub lat: f64,
    pub lon: f64,
    pub ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    SmallMove,
    Glitch,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::SmallMove => "small_move",
            SkipReason::Glitch => "glitch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Non-finite coordinates; nothing was stored.
    Rejected,
    Accepted { first: bool },
    /// The HTTP call is acknowledged but nothing is emitted or stored.
    Skipped(SkipReason),
}

/// Per-device last-position store with anti-spam and anti-glitch
/// filtering. Sharded so devices do not contend with each other.
pub struct DeviceStore {
    config: IngestConfig,
    shards: Vec<RwLock<HashMap<String, DeviceRecord>>>,
}

impl DeviceStore {
    pub fn new(config: IngestConfig) -> Self {
        DeviceStore {
            config,
            shards: (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, user_id: &str) -> &RwLock<HashMap<String, DeviceRecord>> {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    pub fn ingest(&self, user_id: &str, lat: f64, lon: f64, ts: i64) -> IngestOutcome {
        if !Coordinate::new(lat, lon).is_finite() {
            return IngestOutcome::Rejected;
        }

        let mut shard = self.shard(user_id).write().unwrap();
        let outcome = match shard.get(user_id) {
            None => IngestOutcome::Accepted { first: true },
            Some(prev) => {
                let dt = (ts - prev.ts) as f64 / 1000.0;
                let d = distance_meters(Coordinate::new(prev.lat, prev.lon), Coordinate::new(lat, lon));

                if d < self.config.min_move_meters && dt < self.config.min_interval_seconds {
                    IngestOutcome::Skipped(SkipReason::SmallMove)
                } else if dt > 0.0 && d / dt > self.config.max_jump_speed_ms {
                    log::warn!(
                        "anomalous jump of {:.1} m in {:.2} s for {}, ignored",
                        d,
                        dt,
                        user_id
                    );
                    IngestOutcome::Skipped(SkipReason::Glitch)
                } else {
                    IngestOutcome::Accepted { first: false }
                }
            }
        };

        if let IngestOutcome::Accepted { .. } = outcome {
            shard.insert(
                user_id.to_string(),
                DeviceRecord {
                    user_id: user_id.to_string(),
                    lat,
                    lon,
                    ts,
                },
            );
        }
        outcome
    }

    /// Everything known, for the privileged snapshot and the admin API.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records = Vec::new();
        for shard in &self.shards {
            records.extend(shard.read().unwrap().values().cloned());
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn store() -> DeviceStore {
        DeviceStore::new(IngestConfig::default())
    }

    #[test]
    fn first_sample_is_always_accepted() {
        let store = store();
        assert_eq!(
            store.ingest("galaxy-1a2b", 0.0, 0.0, T0),
            IngestOutcome::Accepted { first: true }
        );
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn small_move_then_glitch_are_skipped() {
        let store = store();
        store.ingest("galaxy-1a2b", 0.0, 0.0, T0);

        // ~2 m after 0.2 s: spam.
        assert_eq!(
            store.ingest("galaxy-1a2b", 0.000018, 0.0, T0 + 200),
            IngestOutcome::Skipped(SkipReason::SmallMove)
        );

        // ~10 km one second after the last accepted sample: teleport.
        assert_eq!(
            store.ingest("galaxy-1a2b", 0.09, 0.0, T0 + 1000),
            IngestOutcome::Skipped(SkipReason::Glitch)
        );

        // Neither skip touched the stored record.
        let records = store.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].ts, T0);
        assert_eq!(records[0].lat, 0.0);
    }

    #[test]
    fn plausible_movement_updates_the_record() {
        let store = store();
        store.ingest("galaxy-1a2b", 0.0, 0.0, T0);
        assert_eq!(
            store.ingest("galaxy-1a2b", 0.0001, 0.0, T0 + 5000),
            IngestOutcome::Accepted { first: false }
        );
        assert_eq!(store.snapshot()[0].ts, T0 + 5000);
    }

    #[test]
    fn stationary_heartbeats_pass_the_spam_filter() {
        let store = store();
        store.ingest("galaxy-1a2b", 0.0, 0.0, T0);
        // Same spot, but 15 s apart: not spam, keeps the record fresh.
        assert_eq!(
            store.ingest("galaxy-1a2b", 0.0, 0.0, T0 + 15_000),
            IngestOutcome::Accepted { first: false }
        );
    }

    #[test]
    fn non_finite_coordinates_are_rejected() {
        let store = store();
        assert_eq!(store.ingest("x", f64::NAN, 0.0, T0), IngestOutcome::Rejected);
        assert_eq!(
            store.ingest("x", 0.0, f64::INFINITY, T0),
            IngestOutcome::Rejected
        );
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn devices_are_independent() {
        let store = store();
        store.ingest("a", 0.0, 0.0, T0);
        assert_eq!(
            store.ingest("b", 0.000018, 0.0, T0 + 200),
            IngestOutcome::Accepted { first: true }
        );
        assert_eq!(store.snapshot().len(), 2);
    }
}

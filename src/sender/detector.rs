use crate::config::DetectorConfig;
use crate::geo::{distance_meters, Coordinate};

/// Above this accuracy, a displacement smaller than the error radius is
/// treated as GPS noise rather than movement.
const NOISE_ACCURACY_FLOOR_M: f64 = 10.0;

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub coord: Coordinate,
    pub ts_ms: i64,
    pub accuracy_m: Option<f64>,
    pub speed_ms: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep for display only, nothing goes to the network.
    Hold,
    /// Accuracy too poor to use and no heartbeat due. No state change.
    Discard,
    Send { heartbeat: bool },
}

/// Per-sample state machine deciding whether a sample represents confirmed
/// movement or a due heartbeat. Distance and speed alone would flag
/// transient GPS jumps as movement; requiring consecutive qualifying
/// samples suppresses single-sample spikes.
#[derive(Debug)]
pub struct MovementDetector {
    config: DetectorConfig,
    last_sent: Option<Coordinate>,
    last_sent_at_ms: i64,
    confirm_count: u32,
}

impl MovementDetector {
    pub fn new(config: DetectorConfig) -> Self {
        MovementDetector {
            config,
            last_sent: None,
            last_sent_at_ms: 0,
            confirm_count: 0,
        }
    }

    pub fn decide(&mut self, sample: &Sample) -> Decision {
        let dist = match self.last_sent {
            Some(prev) => distance_meters(prev, sample.coord),
            None => f64::INFINITY,
        };
        let heartbeat_due = self.heartbeat_due(sample.ts_ms);

        let accuracy = sample.accuracy_m.unwrap_or(f64::MAX);
        if accuracy > self.config.max_accuracy_m && !heartbeat_due {
            return Decision::Discard;
        }

        let probably_noise = accuracy > NOISE_ACCURACY_FLOOR_M && dist < accuracy;
        let speed = sample.speed_ms.unwrap_or(0.0);
        let still_by_speed = speed < self.config.min_speed_ms;
        let moved_by_distance = dist >= self.config.min_move_meters;

        if moved_by_distance && !still_by_speed && !probably_noise {
            self.confirm_count += 1;
        } else {
            self.confirm_count = 0;
        }

        if self.confirm_count >= self.config.confirmations {
            Decision::Send { heartbeat: false }
        } else if heartbeat_due {
            Decision::Send { heartbeat: true }
        } else {
            Decision::Hold
        }
    }

    /// Record a successful send. Heartbeat sends do not reset the
    /// confirmation counter.
    pub fn mark_sent(&mut self, coord: Coordinate, ts_ms: i64, movement: bool) {
        self.last_sent = Some(coord);
        self.last_sent_at_ms = ts_ms;
        if movement {
            self.confirm_count = 0;
        }
    }

    pub fn heartbeat_due(&self, now_ms: i64) -> bool {
        (now_ms - self.last_sent_at_ms) as f64 / 1000.0 >= self.config.stale_seconds
    }

    pub fn confirm_count(&self) -> u32 {
        self.confirm_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn detector() -> MovementDetector {
        MovementDetector::new(DetectorConfig::default())
    }

    fn sample(lat: f64, lon: f64, ts_ms: i64, accuracy: f64, speed: f64) -> Sample {
        Sample {
            coord: Coordinate::new(lat, lon),
            ts_ms,
            accuracy_m: Some(accuracy),
            speed_ms: Some(speed),
        }
    }

    // ~11.1 m per 1e-4 degrees of latitude.
    const DEG_10M: f64 = 0.00009;

    #[test]
    fn stationary_device_sends_heartbeats_only() {
        let mut det = detector();

        // First sample: heartbeat due (nothing ever sent).
        let first = sample(-34.6, -58.38, T0, 5.0, 0.0);
        assert_eq!(det.decide(&first), Decision::Send { heartbeat: true });
        det.mark_sent(first.coord, first.ts_ms, false);

        let mut sends = 0;
        for i in 1..=30 {
            let s = sample(-34.6, -58.38, T0 + i * 1000, 5.0, 0.0);
            match det.decide(&s) {
                Decision::Send { heartbeat } => {
                    assert!(heartbeat, "stationary device must never confirm movement");
                    det.mark_sent(s.coord, s.ts_ms, false);
                    sends += 1;
                }
                Decision::Hold => {}
                Decision::Discard => panic!("good accuracy must not be discarded"),
            }
        }
        // 30 s of 1 Hz samples with 15 s staleness: exactly two heartbeats.
        assert_eq!(sends, 2);
        assert_eq!(det.confirm_count(), 0);
    }

    #[test]
    fn two_qualifying_samples_confirm_movement() {
        let mut det = detector();
        // Prime with a still sample so the counter starts from 0.
        let start = sample(0.0, 0.0, T0, 5.0, 0.0);
        assert_eq!(det.decide(&start), Decision::Send { heartbeat: true });
        det.mark_sent(start.coord, start.ts_ms, false);
        assert_eq!(det.confirm_count(), 0);

        let s1 = sample(DEG_10M, 0.0, T0 + 1000, 5.0, 1.0);
        assert_eq!(det.decide(&s1), Decision::Hold);
        assert_eq!(det.confirm_count(), 1);

        let s2 = sample(2.0 * DEG_10M, 0.0, T0 + 2000, 5.0, 1.0);
        assert_eq!(det.decide(&s2), Decision::Send { heartbeat: false });

        det.mark_sent(s2.coord, s2.ts_ms, true);
        assert_eq!(det.confirm_count(), 0);
    }

    #[test]
    fn poor_accuracy_discarded_without_state_change() {
        let mut det = detector();
        let start = sample(0.0, 0.0, T0, 5.0, 0.0);
        det.decide(&start);
        det.mark_sent(start.coord, start.ts_ms, false);

        let s1 = sample(DEG_10M, 0.0, T0 + 1000, 5.0, 1.0);
        det.decide(&s1);
        assert_eq!(det.confirm_count(), 1);

        let bad = sample(2.0 * DEG_10M, 0.0, T0 + 2000, 50.0, 1.0);
        assert_eq!(det.decide(&bad), Decision::Discard);
        assert_eq!(det.confirm_count(), 1);
    }

    #[test]
    fn small_displacement_under_error_radius_is_noise() {
        let mut det = detector();
        let start = sample(0.0, 0.0, T0, 5.0, 0.0);
        det.decide(&start);
        det.mark_sent(start.coord, start.ts_ms, false);

        // 10 m displacement, 15 m error radius: resets the counter even
        // though distance and speed both qualify.
        let s = sample(DEG_10M, 0.0, T0 + 1000, 15.0, 1.0);
        assert_eq!(det.decide(&s), Decision::Hold);
        assert_eq!(det.confirm_count(), 0);
    }

    #[test]
    fn slow_samples_never_accumulate_confirmations() {
        let mut det = detector();
        let start = sample(0.0, 0.0, T0, 5.0, 0.0);
        det.decide(&start);
        det.mark_sent(start.coord, start.ts_ms, false);

        for i in 1..=5 {
            let s = sample(i as f64 * DEG_10M, 0.0, T0 + i * 1000, 5.0, 0.2);
            assert_eq!(det.decide(&s), Decision::Hold);
            assert_eq!(det.confirm_count(), 0);
        }
    }
}

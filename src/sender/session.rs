use crate::config::SessionConfig;
use crate::geo::{distance_meters, Coordinate};
use crate::sender::detector::Sample;

/// Speeds at or below this never feed the speed average.
const VALID_SPEED_FLOOR_MS: f64 = 0.3;

/// Hops shorter than this are sub-meter jitter and add no distance.
const MIN_HOP_M: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct SessionPoint {
    pub coord: Coordinate,
    pub ts_ms: i64,
    pub speed_ms: f64,
}

/// Accumulates distance and speed for a bounded recording session,
/// independent of what the detector sends to the network.
#[derive(Debug)]
pub struct SessionAggregator {
    config: SessionConfig,
    active: bool,
    points: Vec<SessionPoint>,
    distance_m: f64,
    total_speed: f64,
    speed_samples: u32,
}

impl SessionAggregator {
    pub fn new(config: SessionConfig) -> Self {
        SessionAggregator {
            config,
            active: false,
            points: Vec::new(),
            distance_m: 0.0,
            total_speed: 0.0,
            speed_samples: 0,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
        self.points.clear();
        self.distance_m = 0.0;
        self.total_speed = 0.0;
        self.speed_samples = 0;
    }

    /// Freezes the session. Points stay around for export.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn observe(&mut self, sample: &Sample) {
        if !self.active {
            return;
        }
        let speed = sample.speed_ms.unwrap_or(0.0);
        if speed < self.config.stopped_speed_ms {
            return;
        }
        let accuracy = sample.accuracy_m.unwrap_or(f64::MAX);
        if accuracy > self.config.max_accuracy_m {
            return;
        }

        if let Some(last) = self.points.last() {
            let hop = distance_meters(last.coord, sample.coord);
            if hop >= self.config.distance_threshold_m && hop >= MIN_HOP_M {
                self.distance_m += hop;
            }
        }
        if speed > VALID_SPEED_FLOOR_MS {
            self.total_speed += speed;
            self.speed_samples += 1;
        }
        self.points.push(SessionPoint {
            coord: sample.coord,
            ts_ms: sample.ts_ms,
            speed_ms: speed,
        });
    }

    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    pub fn points(&self) -> &[SessionPoint] {
        &self.points
    }

    /// Mean of valid speed samples, falling back to distance over elapsed
    /// time when none exist.
    pub fn avg_speed_ms(&self) -> f64 {
        if self.speed_samples > 0 {
            return self.total_speed / self.speed_samples as f64;
        }
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => {
                let elapsed = (last.ts_ms - first.ts_ms) as f64 / 1000.0;
                if elapsed > 0.0 {
                    self.distance_m / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    fn sample(lat: f64, ts_ms: i64, accuracy: f64, speed: f64) -> Sample {
        Sample {
            coord: Coordinate::new(lat, 0.0),
            ts_ms,
            accuracy_m: Some(accuracy),
            speed_ms: Some(speed),
        }
    }

    #[test]
    fn sub_threshold_hop_adds_no_distance() {
        let mut session = SessionAggregator::new(SessionConfig::default());
        session.start();

        // 0 m, ~1.1 m, ~11.1 m from origin; only the second hop (~10 m)
        // may accumulate.
        session.observe(&sample(0.0, T0, 5.0, 1.0));
        session.observe(&sample(0.00001, T0 + 1000, 5.0, 1.0));
        session.observe(&sample(0.0001, T0 + 2000, 5.0, 1.0));

        assert_eq!(session.points().len(), 3);
        assert!(
            (session.distance_m() - 10.0).abs() < 0.5,
            "got {}",
            session.distance_m()
        );
        assert!((session.avg_speed_ms() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inactive_session_ignores_samples() {
        let mut session = SessionAggregator::new(SessionConfig::default());
        session.observe(&sample(0.0, T0, 5.0, 1.0));
        assert!(session.points().is_empty());

        session.start();
        session.observe(&sample(0.0, T0, 5.0, 1.0));
        session.stop();
        session.observe(&sample(0.001, T0 + 1000, 5.0, 1.0));
        // Frozen, but the recorded point survives for export.
        assert_eq!(session.points().len(), 1);
    }

    #[test]
    fn stopped_or_inaccurate_samples_are_skipped() {
        let mut session = SessionAggregator::new(SessionConfig::default());
        session.start();
        session.observe(&sample(0.0, T0, 5.0, 0.1)); // below stopped threshold
        session.observe(&sample(0.0, T0, 50.0, 1.0)); // accuracy too poor
        assert!(session.points().is_empty());
    }

    #[test]
    fn avg_speed_falls_back_to_distance_over_time() {
        let config = SessionConfig {
            stopped_speed_ms: 0.0,
            ..SessionConfig::default()
        };
        let mut session = SessionAggregator::new(config);
        session.start();
        // Speeds never exceed the valid floor, so no speed samples accrue.
        session.observe(&sample(0.0, T0, 5.0, 0.2));
        session.observe(&sample(0.0001, T0 + 10_000, 5.0, 0.2));
        let avg = session.avg_speed_ms();
        assert!((avg - session.distance_m() / 10.0).abs() < 1e-9);
    }

    #[test]
    fn restart_resets_accumulators() {
        let mut session = SessionAggregator::new(SessionConfig::default());
        session.start();
        session.observe(&sample(0.0, T0, 5.0, 1.0));
        session.observe(&sample(0.001, T0 + 1000, 5.0, 1.0));
        assert!(session.distance_m() > 0.0);

        session.start();
        assert_eq!(session.distance_m(), 0.0);
        assert!(session.points().is_empty());
    }
}

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::Config;
use crate::geo::Coordinate;
use crate::sender::client::{LocationClient, LocationPush};
use crate::sender::detector::{Decision, MovementDetector, Sample};
use crate::sender::discovery::{DiscoveryError, Fetch, ReqwestFetcher, Resolver};
use crate::sender::session::SessionAggregator;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("tracking already running")]
    AlreadyRunning,
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

#[derive(Debug, Clone, Default)]
pub struct TrackingStatus {
    pub endpoint: Option<String>,
    pub last_coord: Option<Coordinate>,
    pub sent: u64,
    pub heartbeats: u64,
    pub session_distance_m: f64,
    pub session_avg_speed_ms: f64,
    pub session_points: usize,
}

#[derive(Debug)]
struct Shared {
    status: TrackingStatus,
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Owns one tracking session: the movement detector, the session
/// aggregator, the heartbeat timer, and the discovery re-poll all live in
/// a single worker task, so sender state stays single-writer.
pub struct Tracking {
    shared: Arc<StdMutex<Shared>>,
    worker: Option<WorkerHandle>,
}

impl Tracking {
    pub fn new() -> Self {
        Tracking {
            shared: Arc::new(StdMutex::new(Shared {
                status: TrackingStatus::default(),
            })),
            worker: None,
        }
    }

    pub fn status(&self) -> TrackingStatus {
        self.shared.lock().unwrap().status.clone()
    }

    /// Resolves an endpoint and spawns the worker. Tracking cannot start
    /// without a resolved endpoint; that failure is surfaced to the caller.
    pub async fn start(
        &mut self,
        config: Config,
        device_id: String,
        samples: mpsc::Receiver<Sample>,
    ) -> Result<(), TrackingError> {
        if self.worker.is_some() {
            return Err(TrackingError::AlreadyRunning);
        }

        let resolver = Resolver::new(config.discovery.clone(), ReqwestFetcher::default());
        let endpoint = resolver.resolve().await?;

        {
            let mut locked = self.shared.lock().unwrap();
            locked.status = TrackingStatus {
                endpoint: Some(endpoint.clone()),
                ..TrackingStatus::default()
            };
        }

        let shared = self.shared.clone();
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_tracking_loop(
            shared, config, device_id, endpoint, resolver, samples, stop_rx,
        ));

        self.worker = Some(WorkerHandle { stop_tx, join });
        Ok(())
    }

    /// Deterministic cancellation: signals the worker and waits for it to
    /// wind down. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.await;
        }
    }

    /// Blocks until the worker ends on its own (sample source closed).
    /// Clears the handle once the join completes so a later `stop` is a
    /// no-op rather than a second await of a finished task; cancelling
    /// `wait` mid-join leaves the worker in place for `stop`.
    pub async fn wait(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            let _ = (&mut worker.join).await;
            self.worker = None;
        }
    }
}

impl Default for Tracking {
    fn default() -> Self {
        Tracking::new()
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_tracking_loop<F: Fetch>(
    shared: Arc<StdMutex<Shared>>,
    config: Config,
    device_id: String,
    mut endpoint: String,
    resolver: Resolver<F>,
    mut samples: mpsc::Receiver<Sample>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut detector = MovementDetector::new(config.detector.clone());
    let mut session = SessionAggregator::new(config.session.clone());
    session.start();

    let client = LocationClient::new(Duration::from_secs(config.sender.post_timeout_seconds));

    let heartbeat_check = Duration::from_secs(config.sender.heartbeat_check_seconds.max(1));
    let mut heartbeat_tick = interval_at(Instant::now() + heartbeat_check, heartbeat_check);
    heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let poll_interval = Duration::from_secs(config.discovery.poll_interval_seconds.max(1));
    let mut poll_tick = interval_at(Instant::now() + poll_interval, poll_interval);
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut last_coord: Option<Coordinate> = None;

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,

            maybe = samples.recv() => {
                let Some(sample) = maybe else { break };
                last_coord = Some(sample.coord);
                session.observe(&sample);

                match detector.decide(&sample) {
                    Decision::Hold | Decision::Discard => {}
                    Decision::Send { heartbeat } => {
                        let push = LocationPush {
                            user_id: device_id.clone(),
                            lat: sample.coord.lat,
                            lon: sample.coord.lon,
                            ts: sample.ts_ms,
                            heartbeat: heartbeat.then_some(true),
                        };
                        match client.post_location(&endpoint, &push).await {
                            Ok(()) => {
                                detector.mark_sent(sample.coord, sample.ts_ms, !heartbeat);
                                let mut locked = shared.lock().unwrap();
                                locked.status.sent += 1;
                                if heartbeat {
                                    locked.status.heartbeats += 1;
                                }
                            }
                            Err(e) => log::warn!("location send failed: {}", e),
                        }
                    }
                }

                let mut locked = shared.lock().unwrap();
                locked.status.last_coord = last_coord;
                locked.status.session_distance_m = session.distance_m();
                locked.status.session_avg_speed_ms = session.avg_speed_ms();
                locked.status.session_points = session.points().len();
            }

            // Sensors stop emitting on stationary devices; this keeps
            // observers aware the device is still live.
            _ = heartbeat_tick.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                if let Some(coord) = last_coord {
                    if detector.heartbeat_due(now_ms) {
                        let push = LocationPush {
                            user_id: device_id.clone(),
                            lat: coord.lat,
                            lon: coord.lon,
                            ts: now_ms,
                            heartbeat: Some(true),
                        };
                        match client.post_location(&endpoint, &push).await {
                            Ok(()) => {
                                detector.mark_sent(coord, now_ms, false);
                                let mut locked = shared.lock().unwrap();
                                locked.status.sent += 1;
                                locked.status.heartbeats += 1;
                            }
                            Err(e) => log::warn!("forced heartbeat failed: {}", e),
                        }
                    }
                }
            }

            // The relay's public address changes between runs; pick up the
            // new one without disturbing in-flight sends.
            _ = poll_tick.tick() => {
                if let Some(fresh) = resolver.poll_once().await {
                    if fresh != endpoint {
                        log::info!("endpoint updated: {} => {}", endpoint, fresh);
                        endpoint = fresh.clone();
                        shared.lock().unwrap().status.endpoint = Some(fresh);
                    }
                }
            }
        }
    }

    session.stop();
    let mut locked = shared.lock().unwrap();
    locked.status.session_distance_m = session.distance_m();
    locked.status.session_avg_speed_ms = session.avg_speed_ms();
    locked.status.session_points = session.points().len();
}

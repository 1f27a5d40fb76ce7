use crate::config::toml_config::TrackingConfig;
use crate::core::aggregator::RouteAggregator;
use crate::core::eta::EtaEstimator;
use crate::core::geometry::{self, BoundingRegion};
use crate::core::resolver::GeometryResolver;
use crate::core::session::{SessionStart, TrackingSession, TrackingSnapshot};
use crate::domain::model::Coordinate;
use crate::domain::ports::{DirectionsProvider, RouteStore};
use crate::utils::error::{Result, TrackerError};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

const COMMAND_BUFFER: usize = 32;

#[derive(Debug)]
enum Command {
    Pan(BoundingRegion),
    Follow,
    Observer(Coordinate),
    Retry,
    Switch(String),
    Stop,
}

/// What the session task does next.
enum Phase {
    Initialize,
    Run,
    Halted,
    Close,
}

/// Owner-side handle of a running tracking session. Dropping it aborts the
/// session task, cancelling its timers and in-flight requests.
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<TrackingSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshots.borrow().clone()
    }

    /// A receiver that is notified on every published change.
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshots.clone()
    }

    pub async fn pan(&self, region: BoundingRegion) -> Result<()> {
        self.send(Command::Pan(region)).await
    }

    pub async fn follow_vehicle(&self) -> Result<()> {
        self.send(Command::Follow).await
    }

    pub async fn update_observer(&self, observer: Coordinate) -> Result<()> {
        self.send(Command::Observer(observer)).await
    }

    /// Re-runs initialization from scratch. Ignored while tracking.
    pub async fn retry(&self) -> Result<()> {
        self.send(Command::Retry).await
    }

    pub async fn switch_vehicle(&self, vehicle_id: impl Into<String>) -> Result<()> {
        self.send(Command::Switch(vehicle_id.into())).await
    }

    /// Stops the session and waits for its task to finish. A task that
    /// panicked is reported as [`TrackerError::SessionFailed`].
    pub async fn stop(mut self) -> Result<()> {
        // A send error means the task already exited.
        let _ = self.commands.send(Command::Stop).await;
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Err(e) if e.is_panic() => {
                tracing::error!(session_id = self.id, "Tracking session task panicked");
                Err(TrackerError::SessionFailed {
                    session: self.id,
                    reason: "session task panicked".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TrackerError::SessionClosed { session: self.id })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Collaborators a session needs to (re)initialize itself.
pub struct SessionServices<S: RouteStore, P: DirectionsProvider> {
    pub aggregator: RouteAggregator<S>,
    pub resolver: GeometryResolver<P>,
    pub estimator: EtaEstimator,
    pub tracking: TrackingConfig,
}

/// Spawns the session task for `vehicle_id` and returns its handle.
pub fn spawn_session<S, P>(services: SessionServices<S, P>, vehicle_id: String) -> SessionHandle
where
    S: RouteStore + 'static,
    P: DirectionsProvider + 'static,
{
    let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
    let session = TrackingSession::new(id, vehicle_id, services.tracking.clone());
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());

    let task = SessionTask {
        session,
        services,
        commands: command_rx,
        snapshots: snapshot_tx,
    };
    let handle = tokio::spawn(task.run());

    SessionHandle {
        id,
        commands: command_tx,
        snapshots: snapshot_rx,
        task: Some(handle),
    }
}

/// Locates the vehicle, resolves its route geometry and seeds the ETA.
async fn load_session<S: RouteStore, P: DirectionsProvider>(
    aggregator: RouteAggregator<S>,
    resolver: GeometryResolver<P>,
    estimator: EtaEstimator,
    vehicle_id: String,
) -> Result<SessionStart> {
    let (vehicle, view) = aggregator.locate_vehicle(&vehicle_id).await?;
    let resolution = resolver.resolve_detailed(&view).await;

    // Without a path the reported location is the only thing to show.
    let path = if vehicle.location.is_some() {
        resolution.path
    } else {
        resolution.into_required(view.id())?
    };

    let start_index = vehicle
        .location
        .and_then(|location| geometry::nearest_index(&path.points, &location))
        .unwrap_or(0);

    let eta_minutes = if path.is_empty() {
        view.route.estimated_minutes
    } else {
        f64::from(estimator.remaining_minutes(&path.points, start_index, view.congestion))
    };

    Ok(SessionStart {
        vehicle,
        path,
        start_index,
        eta_minutes,
    })
}

struct SessionTask<S: RouteStore, P: DirectionsProvider> {
    session: TrackingSession,
    services: SessionServices<S, P>,
    commands: mpsc::Receiver<Command>,
    snapshots: watch::Sender<TrackingSnapshot>,
}

impl<S: RouteStore + 'static, P: DirectionsProvider + 'static> SessionTask<S, P> {
    async fn run(mut self) {
        let session_id = self.session.id();
        tracing::info!(session_id, vehicle_id = %self.session.vehicle_id(), "Tracking session started");

        let mut phase = Phase::Initialize;
        loop {
            phase = match phase {
                Phase::Initialize => self.initialize().await,
                Phase::Run => self.run_ticks().await,
                Phase::Halted => self.wait_for_retry().await,
                Phase::Close => break,
            };
        }

        self.session.close();
        self.publish();
        tracing::info!(session_id, "Tracking session closed");
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.snapshot());
    }

    async fn initialize(&mut self) -> Phase {
        let generation = self.session.begin_initializing();
        self.publish();
        tracing::debug!(
            session_id = self.session.id(),
            generation,
            vehicle_id = %self.session.vehicle_id(),
            "Initializing tracking session"
        );

        // Dropping this future on switch/stop cancels its store and provider calls.
        let load = load_session(
            self.services.aggregator.clone(),
            self.services.resolver.clone(),
            self.services.estimator.clone(),
            self.session.vehicle_id().to_string(),
        );
        tokio::pin!(load);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    None | Some(Command::Stop) => return Phase::Close,
                    Some(Command::Switch(vehicle_id)) => {
                        self.session.switch_vehicle(vehicle_id);
                        return Phase::Initialize;
                    }
                    Some(Command::Retry) => return Phase::Initialize,
                    Some(command) => {
                        self.apply(command);
                        self.publish();
                    }
                },

                outcome = &mut load => return self.finish_initializing(generation, outcome),
            }
        }
    }

    fn finish_initializing(&mut self, generation: u64, outcome: Result<SessionStart>) -> Phase {
        let session_id = self.session.id();
        let applied = match outcome {
            Ok(start) => {
                let points = start.path.len();
                let source = start.path.source;
                self.session.start(generation, start).map(|_| {
                    tracing::info!(session_id, points, source = %source, "Tracking vehicle");
                    Phase::Run
                })
            }
            Err(e) => {
                tracing::warn!(session_id, error = %e, "Tracking session failed to initialize");
                self.session
                    .fail(generation, e.user_friendly_message())
                    .map(|_| Phase::Halted)
            }
        };

        match applied {
            Ok(next) => {
                self.publish();
                next
            }
            Err(e) => {
                tracing::debug!(session_id, generation, error = %e, "Discarding stale initialization result");
                Phase::Initialize
            }
        }
    }

    async fn run_ticks(&mut self) -> Phase {
        let tracking = &self.services.tracking;
        let position_period = tracking.position_interval();
        let eta_period = tracking.eta_interval();

        let mut position_ticks = interval_at(Instant::now() + position_period, position_period);
        let mut eta_ticks = interval_at(Instant::now() + eta_period, eta_period);
        position_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        eta_ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    None | Some(Command::Stop) => return Phase::Close,
                    Some(Command::Switch(vehicle_id)) => {
                        self.session.switch_vehicle(vehicle_id);
                        return Phase::Initialize;
                    }
                    Some(Command::Retry) => {
                        tracing::debug!(session_id = self.session.id(), "Retry ignored while tracking");
                    }
                    Some(command) => {
                        self.apply(command);
                        self.publish();
                    }
                },

                _ = position_ticks.tick() => {
                    self.session.advance_position();
                    tracing::debug!(session_id = self.session.id(), index = self.session.index(), "Position tick");
                    self.publish();
                }

                _ = eta_ticks.tick() => {
                    self.session.tick_eta();
                    tracing::debug!(session_id = self.session.id(), eta = self.session.remaining_eta(), "ETA tick");
                    self.publish();
                }
            }
        }
    }

    async fn wait_for_retry(&mut self) -> Phase {
        loop {
            match self.commands.recv().await {
                None | Some(Command::Stop) => return Phase::Close,
                Some(Command::Retry) => return Phase::Initialize,
                Some(Command::Switch(vehicle_id)) => {
                    self.session.switch_vehicle(vehicle_id);
                    return Phase::Initialize;
                }
                Some(command) => {
                    self.apply(command);
                    self.publish();
                }
            }
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Pan(region) => {
                if self.session.pan(region) {
                    tracing::info!(session_id = self.session.id(), "Auto-follow suspended by pan");
                }
            }
            Command::Follow => {
                if self.session.follow_vehicle() {
                    tracing::info!(session_id = self.session.id(), "Auto-follow resumed");
                }
            }
            Command::Observer(observer) => self.session.update_observer(observer),
            Command::Retry | Command::Switch(_) | Command::Stop => {}
        }
    }
}

use crate::config::toml_config::TrackingConfig;
use crate::core::geometry::BoundingRegion;
use crate::domain::model::{Coordinate, PathSource, ResolvedPath, RouteStatus, Vehicle};
use crate::utils::error::{Result, TrackerError};
use crate::utils::format;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum TrackingState {
    Initializing,
    Tracking,
    ManualOverride,
    Error(String),
    Closed,
}

impl TrackingState {
    /// Ticks only move the simulation in these states.
    pub fn is_live(&self) -> bool {
        matches!(self, TrackingState::Tracking | TrackingState::ManualOverride)
    }
}

/// Everything a successful initialization hands to the session.
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub vehicle: Vehicle,
    pub path: ResolvedPath,
    pub start_index: usize,
    pub eta_minutes: f64,
}

/// Read-only copy of the session published to observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSnapshot {
    pub session_id: u64,
    pub state: TrackingState,
    pub vehicle_id: String,
    pub route_id: Option<String>,
    pub generation: u64,
    pub position: Option<Coordinate>,
    pub index: usize,
    pub path_len: usize,
    pub path_source: PathSource,
    pub remaining_eta_minutes: f64,
    pub auto_follow: bool,
    pub camera: Option<BoundingRegion>,
    pub route_status: RouteStatus,
    pub updated_at: DateTime<Utc>,
}

impl TrackingSnapshot {
    /// Remaining ETA for display, rounded up to whole minutes.
    pub fn eta_label(&self) -> String {
        format::format_duration(self.remaining_eta_minutes.ceil() as u32)
    }
}

/// Single-writer state of one live-tracking view.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    id: u64,
    config: TrackingConfig,
    state: TrackingState,
    vehicle_id: String,
    route_id: Option<String>,
    generation: u64,
    path: ResolvedPath,
    index: usize,
    remaining_eta: f64,
    auto_follow: bool,
    camera: Option<BoundingRegion>,
    observer: Option<Coordinate>,
    vehicle_location: Option<Coordinate>,
}

impl TrackingSession {
    pub fn new(id: u64, vehicle_id: impl Into<String>, config: TrackingConfig) -> Self {
        Self {
            id,
            config,
            state: TrackingState::Initializing,
            vehicle_id: vehicle_id.into(),
            route_id: None,
            generation: 0,
            path: ResolvedPath::none(),
            index: 0,
            remaining_eta: 0.0,
            auto_follow: true,
            camera: None,
            observer: None,
            vehicle_location: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn remaining_eta(&self) -> f64 {
        self.remaining_eta
    }

    pub fn auto_follow(&self) -> bool {
        self.auto_follow
    }

    pub fn camera(&self) -> Option<BoundingRegion> {
        self.camera
    }

    /// Discards the current path and starts a new initialization round.
    /// Results tagged with an earlier generation are rejected afterwards.
    pub fn begin_initializing(&mut self) -> u64 {
        self.generation += 1;
        self.state = TrackingState::Initializing;
        self.route_id = None;
        self.path = ResolvedPath::none();
        self.index = 0;
        self.remaining_eta = 0.0;
        self.auto_follow = true;
        self.camera = None;
        self.vehicle_location = None;
        self.generation
    }

    /// Points the session at another vehicle; the caller re-initializes.
    pub fn switch_vehicle(&mut self, vehicle_id: impl Into<String>) {
        self.vehicle_id = vehicle_id.into();
    }

    fn check_generation(&self, generation: u64) -> Result<()> {
        if generation != self.generation || self.state == TrackingState::Closed {
            return Err(TrackerError::SessionClosed { session: self.id });
        }
        Ok(())
    }

    pub fn start(&mut self, generation: u64, start: SessionStart) -> Result<()> {
        self.check_generation(generation)?;

        self.route_id = Some(start.vehicle.route_id.clone());
        self.vehicle_location = start.vehicle.location;
        self.index = if start.path.is_empty() {
            0
        } else {
            start.start_index.min(start.path.len() - 1)
        };
        self.path = start.path;
        self.remaining_eta = start.eta_minutes.max(0.0);
        self.auto_follow = true;
        self.state = TrackingState::Tracking;
        self.camera = None;
        self.recenter();
        Ok(())
    }

    pub fn fail(&mut self, generation: u64, reason: impl Into<String>) -> Result<()> {
        self.check_generation(generation)?;
        self.state = TrackingState::Error(reason.into());
        Ok(())
    }

    /// Simulated vehicle position: the current path point, or the reported
    /// location when there is no path.
    pub fn position(&self) -> Option<Coordinate> {
        self.path
            .points
            .get(self.index)
            .copied()
            .or(self.vehicle_location)
    }

    /// Advances one point, wrapping to the start. No-op on an empty path.
    pub fn advance_position(&mut self) {
        if !self.state.is_live() || self.path.is_empty() {
            return;
        }
        self.index = (self.index + 1) % self.path.len();
        self.recenter();
    }

    /// Counts the ETA down by the configured step, stopping at zero.
    pub fn tick_eta(&mut self) {
        if !self.state.is_live() {
            return;
        }
        self.remaining_eta = (self.remaining_eta - self.config.eta_step_minutes).max(0.0);
    }

    /// User pan: suspends auto-follow until [`TrackingSession::follow_vehicle`].
    pub fn pan(&mut self, region: BoundingRegion) -> bool {
        if !self.state.is_live() {
            return false;
        }
        self.state = TrackingState::ManualOverride;
        self.auto_follow = false;
        self.camera = Some(region);
        true
    }

    pub fn follow_vehicle(&mut self) -> bool {
        if !self.state.is_live() {
            return false;
        }
        self.state = TrackingState::Tracking;
        self.auto_follow = true;
        self.camera = None;
        self.recenter();
        true
    }

    pub fn update_observer(&mut self, observer: Coordinate) {
        self.observer = Some(observer);
        self.recenter();
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.state = TrackingState::Closed;
        self.auto_follow = false;
    }

    /// Frames the midpoint of observer and vehicle. Small moves are ignored.
    fn recenter(&mut self) {
        if !self.auto_follow || !self.state.is_live() {
            return;
        }
        let Some(vehicle) = self.position() else {
            return;
        };
        let target = match self.observer {
            Some(observer) => observer.midpoint(&vehicle),
            None => vehicle,
        };

        let threshold = self.config.follow_threshold_degrees;
        let moved = match self.camera {
            Some(camera) => {
                (camera.center.latitude - target.latitude).abs() > threshold
                    || (camera.center.longitude - target.longitude).abs() > threshold
            }
            None => true,
        };
        if moved {
            self.camera = Some(BoundingRegion::around(target, self.config.follow_span_degrees));
        }
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        TrackingSnapshot {
            session_id: self.id,
            state: self.state.clone(),
            vehicle_id: self.vehicle_id.clone(),
            route_id: self.route_id.clone(),
            generation: self.generation,
            position: self.position(),
            index: self.index,
            path_len: self.path.len(),
            path_source: self.path.source,
            remaining_eta_minutes: self.remaining_eta,
            auto_follow: self.auto_follow,
            camera: self.camera,
            route_status: self.path.status(),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate::new(latitude, longitude).unwrap()
    }

    fn vehicle(location: Option<Coordinate>) -> Vehicle {
        Vehicle {
            id: "v1".to_string(),
            route_id: "r1".to_string(),
            plate_number: "KCA 123A".to_string(),
            capacity: 14,
            available: 4,
            location,
        }
    }

    fn tracking(points: Vec<Coordinate>, eta: f64) -> TrackingSession {
        let mut session = TrackingSession::new(1, "v1", TrackingConfig::default());
        let generation = session.begin_initializing();
        let location = points.first().copied();
        session
            .start(
                generation,
                SessionStart {
                    vehicle: vehicle(location),
                    path: ResolvedPath::new(PathSource::StoredGeometry, points),
                    start_index: 0,
                    eta_minutes: eta,
                },
            )
            .unwrap();
        session
    }

    #[test]
    fn test_position_loops_after_path_length_ticks() {
        let points = vec![c(-1.30, 36.80), c(-1.29, 36.81), c(-1.28, 36.82)];
        let mut session = tracking(points.clone(), 10.0);

        for expected in [1, 2, 0, 1] {
            session.advance_position();
            assert_eq!(session.index(), expected);
        }
        assert_eq!(session.position(), Some(points[1]));
    }

    #[test]
    fn test_empty_path_ticks_are_noops() {
        let mut session = TrackingSession::new(1, "v1", TrackingConfig::default());
        let generation = session.begin_initializing();
        let reported = c(-1.2921, 36.8219);
        session
            .start(
                generation,
                SessionStart {
                    vehicle: vehicle(Some(reported)),
                    path: ResolvedPath::none(),
                    start_index: 0,
                    eta_minutes: 15.0,
                },
            )
            .unwrap();

        session.advance_position();
        session.advance_position();
        assert_eq!(session.index(), 0);
        assert_eq!(session.position(), Some(reported));
        assert_eq!(session.snapshot().route_status, RouteStatus::Basic);
    }

    #[test]
    fn test_eta_is_monotone_and_clamped() {
        let mut session = tracking(vec![c(-1.30, 36.80), c(-1.28, 36.82)], 0.25);

        let mut previous = session.remaining_eta();
        for _ in 0..5 {
            session.tick_eta();
            assert!(session.remaining_eta() <= previous);
            assert!(session.remaining_eta() >= 0.0);
            previous = session.remaining_eta();
        }
        assert_eq!(session.remaining_eta(), 0.0);
        assert_eq!(session.snapshot().eta_label(), "0 min");
    }

    #[test]
    fn test_pan_suspends_follow_until_explicit_follow() {
        let mut session = tracking(vec![c(-1.30, 36.80), c(-1.20, 36.90)], 5.0);
        let panned = BoundingRegion::around(c(-1.0, 36.0), 0.05);

        assert!(session.pan(panned));
        assert_eq!(session.state(), &TrackingState::ManualOverride);
        assert!(!session.auto_follow());

        // The simulation keeps running but the camera stays put.
        session.advance_position();
        assert_eq!(session.index(), 1);
        assert_eq!(session.camera(), Some(panned));

        assert!(session.follow_vehicle());
        assert_eq!(session.state(), &TrackingState::Tracking);
        let camera = session.camera().unwrap();
        assert_eq!(camera.center, c(-1.20, 36.90));
        assert_eq!(camera.span_lat, 0.02);
    }

    #[test]
    fn test_camera_targets_observer_midpoint_and_ignores_small_moves() {
        let mut session = tracking(vec![c(-1.30, 36.80), c(-1.30, 36.8005)], 5.0);

        session.update_observer(c(-1.32, 36.80));
        let camera = session.camera().unwrap();
        assert!((camera.center.latitude - -1.31).abs() < 1e-9);

        // Vehicle moves 0.0005 deg, midpoint moves 0.00025: below threshold.
        session.advance_position();
        assert_eq!(session.camera().unwrap().center, camera.center);
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let mut session = TrackingSession::new(7, "v1", TrackingConfig::default());
        let stale = session.begin_initializing();
        session.switch_vehicle("v2");
        let current = session.begin_initializing();

        let start = SessionStart {
            vehicle: vehicle(None),
            path: ResolvedPath::new(PathSource::StageChain, vec![c(-1.3, 36.8), c(-1.2, 36.9)]),
            start_index: 0,
            eta_minutes: 3.0,
        };
        let err = session.start(stale, start.clone()).unwrap_err();
        assert!(matches!(err, TrackerError::SessionClosed { session: 7 }));
        assert_eq!(session.state(), &TrackingState::Initializing);

        session.start(current, start).unwrap();
        assert_eq!(session.state(), &TrackingState::Tracking);
        assert_eq!(session.vehicle_id(), "v2");
    }

    #[test]
    fn test_closed_session_rejects_results_and_ticks() {
        let mut session = tracking(vec![c(-1.30, 36.80), c(-1.28, 36.82)], 5.0);
        let generation = session.generation();
        session.close();

        assert!(session.fail(generation, "late").is_err());
        session.tick_eta();
        assert_eq!(session.remaining_eta(), 5.0);
        assert!(!session.pan(BoundingRegion::around(c(0.0, 0.0), 1.0)));
        assert_eq!(session.snapshot().state, TrackingState::Closed);
    }
}

use anyhow::Result;
use route_tracker::config::toml_config::DirectionsConfig;
use route_tracker::core::congestion::Congestion;
use route_tracker::core::geometry::{self, BoundingRegion};
use route_tracker::domain::model::{RoutePointRecord, RouteRecord, StageRecord, VehicleRecord};
use route_tracker::{
    Coordinate, GoogleDirectionsClient, MemoryStore, PathSource, RouteStatus, TrackerConfig,
    TrackerEngine, TrackingSnapshot, TrackingState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// Directions stay offline (no key) so that paused time never races an HTTP timeout.
fn engine(store: MemoryStore) -> Result<TrackerEngine<MemoryStore, GoogleDirectionsClient>> {
    let provider = GoogleDirectionsClient::new(DirectionsConfig::default())?;
    let mut config = TrackerConfig::with_store("http://localhost:54321/rest/v1");
    config.tracking.eta_step_minutes = 0.5;
    Ok(TrackerEngine::new(Arc::new(store), Arc::new(provider), config)?)
}

fn route(id: &str, points: &[(f64, f64)]) -> RouteRecord {
    RouteRecord {
        id: id.to_string(),
        name: "Outering Road".to_string(),
        start_location: "Pipeline".to_string(),
        end_location: "Allsops".to_string(),
        start_lat: None,
        start_lng: None,
        end_lat: None,
        end_lng: None,
        fare_amount: 80.0,
        estimated_time: 40.0,
        description: None,
        distance: None,
        route_coordinates: points
            .iter()
            .enumerate()
            .map(|(i, (latitude, longitude))| RoutePointRecord {
                latitude: *latitude,
                longitude: *longitude,
                point_order: i as i64,
            })
            .collect(),
    }
}

fn vehicle(id: &str, route_id: &str, location: Option<(f64, f64)>) -> VehicleRecord {
    VehicleRecord {
        id: id.to_string(),
        route_id: route_id.to_string(),
        plate_number: "KBX 777M".to_string(),
        capacity: 14,
        available: 2,
        latitude: location.map(|l| l.0),
        longitude: location.map(|l| l.1),
    }
}

async fn wait_until(
    rx: &mut watch::Receiver<TrackingSnapshot>,
    predicate: impl FnMut(&TrackingSnapshot) -> bool,
) -> Result<TrackingSnapshot> {
    Ok(rx.wait_for(predicate).await?.clone())
}

#[tokio::test(start_paused = true)]
async fn test_tracking_loops_and_counts_down() -> Result<()> {
    let store = MemoryStore::new();
    store
        .insert_route(route(
            "r1",
            &[(-1.2600, 36.8900), (-1.2700, 36.8800), (-1.2800, 36.8700), (-1.2900, 36.8600)],
        ))
        .await;
    store.insert_vehicle(vehicle("v1", "r1", Some((-1.2702, 36.8801)))).await;
    let engine = engine(store)?;

    let handle = engine.start_tracking("v1");
    let mut rx = handle.subscribe();
    let first = wait_until(&mut rx, |s| s.state == TrackingState::Tracking).await?;

    assert_eq!(first.index, 1);
    assert_eq!(first.path_len, 4);
    assert_eq!(first.path_source, PathSource::StoredGeometry);
    assert_eq!(first.route_status, RouteStatus::Basic);
    assert!(first.auto_follow);
    assert!(first.camera.is_some());

    // Offset the reads from the tick instants.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut previous_eta = first.remaining_eta_minutes;
    let mut indices = Vec::new();
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(3_000)).await;
        let snapshot = handle.snapshot();
        assert!(snapshot.remaining_eta_minutes <= previous_eta);
        assert!(snapshot.remaining_eta_minutes >= 0.0);
        previous_eta = snapshot.remaining_eta_minutes;
        indices.push(snapshot.index);
    }
    // Four ticks on a four-point path come back to the start.
    assert_eq!(indices, vec![2, 3, 0, 1]);

    engine.stop_tracking(handle).await?;
    assert_eq!(rx.borrow().state, TrackingState::Closed);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_eta_never_goes_negative() -> Result<()> {
    let store = MemoryStore::new();
    store.insert_route(route("r1", &[(-1.2600, 36.8900), (-1.2700, 36.8800)])).await;
    store.insert_vehicle(vehicle("v1", "r1", None)).await;
    let engine = engine(store)?;

    let handle = engine.start_tracking("v1");
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| s.state == TrackingState::Tracking).await?;

    // A few minutes of ETA at half a minute per six seconds runs out well within ten minutes.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(handle.snapshot().remaining_eta_minutes, 0.0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_manual_override_keeps_simulation_running() -> Result<()> {
    let store = MemoryStore::new();
    store
        .insert_route(route("r1", &[(-1.2600, 36.8900), (-1.2700, 36.8800), (-1.2800, 36.8700)]))
        .await;
    store.insert_vehicle(vehicle("v1", "r1", Some((-1.2600, 36.8900)))).await;
    let engine = engine(store)?;

    let handle = engine.start_tracking("v1");
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| s.state == TrackingState::Tracking).await?;

    let elsewhere = BoundingRegion::around(Coordinate::new(-1.3000, 36.7000)?, 0.05);
    handle.pan(elsewhere).await?;
    wait_until(&mut rx, |s| s.state == TrackingState::ManualOverride).await?;

    tokio::time::sleep(Duration::from_millis(3_100)).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.index, 1);
    assert_eq!(snapshot.camera, Some(elsewhere));
    assert!(!snapshot.auto_follow);

    handle.update_observer(Coordinate::new(-1.2700, 36.9000)?).await?;
    handle.follow_vehicle().await?;
    let following = wait_until(&mut rx, |s| s.state == TrackingState::Tracking).await?;
    let camera = following.camera.expect("camera follows the vehicle");
    // Midpoint of observer (-1.27, 36.90) and vehicle (-1.27, 36.88).
    assert!((camera.center.latitude - -1.2700).abs() < 1e-9);
    assert!((camera.center.longitude - 36.8900).abs() < 1e-9);

    engine.stop_tracking(handle).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_switch_vehicle_recovers_from_error() -> Result<()> {
    let store = MemoryStore::new();
    store.insert_route(route("r1", &[])).await;
    store.insert_vehicle(vehicle("v1", "r1", None)).await;
    let engine = engine(store.clone())?;

    let handle = engine.start_tracking("v1");
    let mut rx = handle.subscribe();
    let failed = wait_until(&mut rx, |s| matches!(s.state, TrackingState::Error(_))).await?;
    assert_eq!(
        failed.state,
        TrackingState::Error("No route geometry is available".to_string())
    );

    // Ticks do nothing while in error.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(matches!(handle.snapshot().state, TrackingState::Error(_)));

    store.insert_vehicle(vehicle("v2", "r1", Some((-1.2600, 36.8900)))).await;
    handle.switch_vehicle("v2").await?;
    let recovered = wait_until(&mut rx, |s| s.state == TrackingState::Tracking).await?;
    assert_eq!(recovered.vehicle_id, "v2");
    assert_eq!(recovered.path_len, 0);
    assert_eq!(recovered.remaining_eta_minutes, 40.0);

    engine.stop_tracking(handle).await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent_and_seed_eta_from_congestion() -> Result<()> {
    let store = MemoryStore::new();
    store.insert_route(route("r1", &[(-1.26, 36.89), (-1.27, 36.88)])).await;
    store.insert_vehicle(vehicle("v1", "r1", None)).await;
    store
        .insert_stage(StageRecord {
            id: "s1".to_string(),
            route_id: "r1".to_string(),
            name: "Pipeline".to_string(),
            latitude: -1.26,
            longitude: 36.89,
            congestion: Some("severe".to_string()),
        })
        .await;
    let engine = engine(store)?;

    let first = engine.start_tracking("v1");
    let second = engine.start_tracking("v1");
    assert_ne!(first.id(), second.id());

    let mut rx = second.subscribe();
    let started = wait_until(&mut rx, |s| s.state == TrackingState::Tracking).await?;
    let distance = geometry::path_length_meters(&[
        Coordinate::new(-1.26, 36.89)?,
        Coordinate::new(-1.27, 36.88)?,
    ]);
    let expected = engine.estimator().minutes_for(distance, Congestion::Severe);
    assert_eq!(started.remaining_eta_minutes, f64::from(expected));

    engine.stop_tracking(second).await?;
    // The receiver keeps the final snapshot.
    assert_eq!(rx.borrow().state, TrackingState::Closed);

    // Retry is ignored by a session that is already tracking.
    assert!(first.retry().await.is_ok());
    engine.stop_tracking(first).await?;
    Ok(())
}

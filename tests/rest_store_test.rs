use anyhow::Result;
use httpmock::prelude::*;
use route_tracker::config::toml_config::{DirectionsConfig, StoreConfig};
use route_tracker::core::congestion::Congestion;
use route_tracker::core::polyline;
use route_tracker::domain::ports::RouteStore;
use route_tracker::{
    Coordinate, GoogleDirectionsClient, RestStore, TrackerConfig, TrackerEngine, TrackerError,
};
use std::sync::Arc;

const API_KEY: &str = "anon-key";

fn store_config(server: &MockServer) -> StoreConfig {
    StoreConfig {
        endpoint: server.url("/rest/v1"),
        api_key: Some(API_KEY.to_string()),
        timeout_seconds: Some(5),
    }
}

async fn mock_collections(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/rest/v1/routes")
                .query_param("select", "*,route_coordinates(latitude,longitude,point_order)")
                .header("apikey", API_KEY)
                .header("Authorization", format!("Bearer {}", API_KEY));
            then.status(200).json_body(serde_json::json!([
                {
                    "id": "r1",
                    "name": "Jogoo Road",
                    "start_location": "Ambassadeur",
                    "end_location": "Donholm",
                    "start_lat": -1.2856,
                    "start_lng": 36.8264,
                    "end_lat": -1.2966,
                    "end_lng": 36.8900,
                    "fare_amount": 70,
                    "estimated_time": 30,
                    "description": null,
                    "distance": 8.1,
                    "route_coordinates": [
                        {"latitude": -1.2966, "longitude": 36.8900, "point_order": 2},
                        {"latitude": -1.2856, "longitude": 36.8264, "point_order": 0},
                        {"latitude": -1.2900, "longitude": 36.8500, "point_order": 1}
                    ]
                },
                {
                    "id": "r2",
                    "name": "Langata Road",
                    "start_location": "Railways",
                    "end_location": "Karen",
                    "fare_amount": 100,
                    "estimated_time": 50
                }
            ]));
        })
        .await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/stages");
            then.status(200).json_body(serde_json::json!([
                {"id": "s1", "route_id": "r1", "name": "Gikomba", "location_latitude": -1.2870, "location_longitude": 36.8350, "congestion": "low"},
                {"id": "s2", "route_id": "r1", "name": "Makadara", "location_latitude": -1.2930, "location_longitude": 36.8650, "congestion": "HIGH"},
                {"id": "s3", "route_id": "r1", "name": "Donholm", "latitude": -1.2966, "longitude": 36.8900, "congestion": "gridlock"},
                {"id": "s9", "route_id": "missing", "name": "Orphan", "latitude": -1.0, "longitude": 36.0, "congestion": "severe"}
            ]));
        })
        .await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/vehicles");
            then.status(200).json_body(serde_json::json!([
                {"id": "v1", "route_id": "r1", "plate_number": "KBZ 512T", "capacity": 33, "available": 5, "latitude": -1.2900, "longitude": 36.8500},
                {"id": "v2", "route_id": "r2", "plate_number": "KCD 888Q", "capacity": 14, "available": 14, "latitude": null, "longitude": null}
            ]));
        })
        .await;
}

fn engine(
    server: &MockServer,
    directions: DirectionsConfig,
) -> Result<TrackerEngine<RestStore, GoogleDirectionsClient>> {
    let mut config = TrackerConfig::with_store(server.url("/rest/v1"));
    config.store = store_config(server);
    config.directions = directions;
    Ok(TrackerEngine::from_config(config)?)
}

#[tokio::test]
async fn test_resolve_route_from_rest_collections() -> Result<()> {
    let server = MockServer::start_async().await;
    mock_collections(&server).await;
    let engine = engine(&server, DirectionsConfig::default())?;

    let view = engine.resolve_route("r1").await?;

    assert_eq!(view.route.name, "Jogoo Road");
    let lats: Vec<f64> = view.stored_path.iter().map(|c| c.latitude).collect();
    assert_eq!(lats, vec![-1.2856, -1.2900, -1.2966]);
    assert_eq!(view.stages.len(), 3);
    assert_eq!(view.stages[2].congestion, Congestion::Unknown);
    assert_eq!(view.congestion, Congestion::High);
    assert_eq!(view.vehicles.len(), 1);

    let legs = view.stage_legs();
    assert_eq!(legs.len(), 2);
    assert_eq!(legs[0].from_stage, "Gikomba");
    Ok(())
}

#[tokio::test]
async fn test_resolve_all_skips_orphans_and_tolerates_missing_fields() -> Result<()> {
    let server = MockServer::start_async().await;
    mock_collections(&server).await;
    let engine = engine(&server, DirectionsConfig::default())?;

    let all = engine.resolve_all().await?;

    assert_eq!(all.len(), 2);
    let langata = &all["r2"];
    assert!(langata.route.start.is_none());
    assert!(langata.stored_path.is_empty());
    assert!(langata.stages.is_empty());
    assert_eq!(langata.vehicles[0].location, None);
    Ok(())
}

#[tokio::test]
async fn test_failed_collection_surfaces_store_unavailable() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/routes");
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/stages");
            then.status(503).body("upstream down");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/vehicles");
            then.status(200).json_body(serde_json::json!([]));
        })
        .await;
    let engine = engine(&server, DirectionsConfig::default())?;

    match engine.resolve_route("r1").await {
        Err(TrackerError::StoreUnavailable { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("503"));
        }
        other => panic!("expected StoreUnavailable, got {:?}", other.map(|v| v.route.id)),
    }
    Ok(())
}

#[tokio::test]
async fn test_publish_provider_path_rewrites_route_coordinates() -> Result<()> {
    let server = MockServer::start_async().await;
    mock_collections(&server).await;

    let generated = vec![
        Coordinate::new(-1.2856, 36.8264)?,
        Coordinate::new(-1.2912, 36.8571)?,
        Coordinate::new(-1.2966, 36.89)?,
    ];
    let directions_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/directions")
                .query_param("origin", "-1.2856,36.8264")
                .query_param("destination", "-1.2966,36.89")
                .query_param("mode", "driving");
            then.status(200).json_body(serde_json::json!({
                "status": "OK",
                "routes": [{"overview_polyline": {"points": polyline::encode(&generated)}}]
            }));
        })
        .await;
    let delete_mock = server
        .mock_async(|when, then| {
            when.method(DELETE)
                .path("/rest/v1/route_coordinates")
                .query_param("route_id", "eq.r1");
            then.status(204);
        })
        .await;
    let insert_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/rest/v1/route_coordinates")
                .json_body(serde_json::json!([
                    {"route_id": "r1", "latitude": -1.2856, "longitude": 36.8264, "point_order": 0},
                    {"route_id": "r1", "latitude": -1.2912, "longitude": 36.8571, "point_order": 1},
                    {"route_id": "r1", "latitude": -1.2966, "longitude": 36.89, "point_order": 2}
                ]));
            then.status(201);
        })
        .await;

    let directions = DirectionsConfig {
        endpoint: server.url("/directions"),
        api_key: Some("maps-key".to_string()),
        ..DirectionsConfig::default()
    };
    let engine = engine(&server, directions)?;

    let written = engine.publish_provider_path("r1").await?;

    assert_eq!(written, 3);
    directions_mock.assert_async().await;
    delete_mock.assert_async().await;
    insert_mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn test_rest_store_reports_collection_on_bad_payload() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/rest/v1/vehicles");
            then.status(200).json_body(serde_json::json!({"message": "not a list"}));
        })
        .await;

    let store = RestStore::new(store_config(&server))?;
    match store.fetch_vehicles().await {
        Err(TrackerError::StoreError { collection, .. }) => assert_eq!(collection, "vehicles"),
        other => panic!("expected StoreError, got {:?}", other.map(|v| v.len())),
    }
    Ok(())
}

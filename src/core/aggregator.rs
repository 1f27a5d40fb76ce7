use crate::core::congestion;
use crate::domain::model::{
    Route, RouteRecord, RouteView, Stage, StageRecord, Vehicle, VehicleRecord,
};
use crate::domain::ports::RouteStore;
use crate::utils::error::{Result, TrackerError};
use std::collections::HashMap;
use std::sync::Arc;

/// The three collections as fetched, before grouping.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    pub routes: Vec<RouteRecord>,
    pub stages: Vec<StageRecord>,
    pub vehicles: Vec<VehicleRecord>,
}

/// Child rows grouped by their route foreign key.
struct Grouped {
    stages: HashMap<String, Vec<StageRecord>>,
    vehicles: HashMap<String, Vec<VehicleRecord>>,
}

impl Grouped {
    fn from_snapshot(stages: Vec<StageRecord>, vehicles: Vec<VehicleRecord>) -> Self {
        let mut by_route_stages: HashMap<String, Vec<StageRecord>> = HashMap::new();
        for stage in stages {
            by_route_stages
                .entry(stage.route_id.clone())
                .or_default()
                .push(stage);
        }

        let mut by_route_vehicles: HashMap<String, Vec<VehicleRecord>> = HashMap::new();
        for vehicle in vehicles {
            by_route_vehicles
                .entry(vehicle.route_id.clone())
                .or_default()
                .push(vehicle);
        }

        Self {
            stages: by_route_stages,
            vehicles: by_route_vehicles,
        }
    }
}

/// Assembles one view. Rows belonging to the view are validated here.
fn assemble(
    record: RouteRecord,
    stages: Vec<StageRecord>,
    vehicles: Vec<VehicleRecord>,
) -> Result<RouteView> {
    let route = Route::try_from(record)?;
    let stages = stages
        .into_iter()
        .map(Stage::try_from)
        .collect::<Result<Vec<_>>>()?;
    let vehicles = vehicles
        .into_iter()
        .map(Vehicle::try_from)
        .collect::<Result<Vec<_>>>()?;

    let mut ordered = route.stored_points.clone();
    ordered.sort_by_key(|point| point.order);
    let stored_path = ordered.into_iter().map(|point| point.coordinate).collect();

    let congestion = congestion::worst(stages.iter().map(|stage| stage.congestion));

    Ok(RouteView {
        route,
        stored_path,
        stages,
        vehicles,
        congestion,
    })
}

/// Builds [`RouteView`]s from the independently fetched collections.
pub struct RouteAggregator<S: RouteStore> {
    store: Arc<S>,
}

impl<S: RouteStore> Clone for RouteAggregator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: RouteStore> RouteAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetches all three collections concurrently. Every failed collection is
    /// reported, not just the first.
    pub async fn fetch_snapshot(&self) -> Result<StoreSnapshot> {
        let (routes, stages, vehicles) = tokio::join!(
            self.store.fetch_routes(),
            self.store.fetch_stages(),
            self.store.fetch_vehicles(),
        );

        let mut failures = Vec::new();
        if let Err(e) = &routes {
            failures.push(format!("routes: {}", e));
        }
        if let Err(e) = &stages {
            failures.push(format!("stages: {}", e));
        }
        if let Err(e) = &vehicles {
            failures.push(format!("vehicles: {}", e));
        }

        match (routes, stages, vehicles) {
            (Ok(routes), Ok(stages), Ok(vehicles)) => {
                tracing::debug!(
                    routes = routes.len(),
                    stages = stages.len(),
                    vehicles = vehicles.len(),
                    "Fetched store collections"
                );
                Ok(StoreSnapshot {
                    routes,
                    stages,
                    vehicles,
                })
            }
            _ => {
                tracing::warn!(failures = ?failures, "Store fetch failed");
                Err(TrackerError::StoreUnavailable { failures })
            }
        }
    }

    /// `NotFound` when no route carries `route_id`.
    pub async fn resolve_route(&self, route_id: &str) -> Result<RouteView> {
        let snapshot = self.fetch_snapshot().await?;
        Self::view_from_snapshot(snapshot, route_id)
    }

    /// Every route keyed by id. A route with invalid coordinates fails the
    /// whole call.
    pub async fn resolve_all(&self) -> Result<HashMap<String, RouteView>> {
        let snapshot = self.fetch_snapshot().await?;
        let mut grouped = Grouped::from_snapshot(snapshot.stages, snapshot.vehicles);

        let mut views = HashMap::with_capacity(snapshot.routes.len());
        for record in snapshot.routes {
            let stages = grouped.stages.remove(&record.id).unwrap_or_default();
            let vehicles = grouped.vehicles.remove(&record.id).unwrap_or_default();
            let view = assemble(record, stages, vehicles)?;
            views.insert(view.route.id.clone(), view);
        }

        Ok(views)
    }

    /// The vehicle and the view of the route it belongs to.
    pub async fn locate_vehicle(&self, vehicle_id: &str) -> Result<(Vehicle, RouteView)> {
        let snapshot = self.fetch_snapshot().await?;
        let route_id = snapshot
            .vehicles
            .iter()
            .find(|vehicle| vehicle.id == vehicle_id)
            .map(|vehicle| vehicle.route_id.clone())
            .ok_or_else(|| TrackerError::not_found("vehicle", vehicle_id))?;

        let view = Self::view_from_snapshot(snapshot, &route_id)?;
        let vehicle = view
            .vehicle(vehicle_id)
            .cloned()
            .ok_or_else(|| TrackerError::not_found("vehicle", vehicle_id))?;
        Ok((vehicle, view))
    }

    pub fn view_from_snapshot(snapshot: StoreSnapshot, route_id: &str) -> Result<RouteView> {
        let record = snapshot
            .routes
            .into_iter()
            .find(|route| route.id == route_id)
            .ok_or_else(|| TrackerError::not_found("route", route_id))?;

        let mut grouped = Grouped::from_snapshot(snapshot.stages, snapshot.vehicles);
        let stages = grouped.stages.remove(route_id).unwrap_or_default();
        let vehicles = grouped.vehicles.remove(route_id).unwrap_or_default();

        assemble(record, stages, vehicles)
    }
}

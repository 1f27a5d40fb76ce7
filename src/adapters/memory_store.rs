use crate::domain::model::{RoutePointRecord, RouteRecord, StageRecord, VehicleRecord};
use crate::domain::ports::RouteStore;
use crate::utils::error::{Result, TrackerError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    routes: Vec<RouteRecord>,
    stages: Vec<StageRecord>,
    vehicles: Vec<VehicleRecord>,
    failing: HashSet<String>,
}

/// In-process store, handy for embedding and tests. Rows keep insertion
/// order, like a table without an ORDER BY.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_route(&self, route: RouteRecord) {
        self.tables.write().await.routes.push(route);
    }

    pub async fn insert_stage(&self, stage: StageRecord) {
        self.tables.write().await.stages.push(stage);
    }

    pub async fn insert_vehicle(&self, vehicle: VehicleRecord) {
        self.tables.write().await.vehicles.push(vehicle);
    }

    /// Makes every fetch of `collection` fail until [`MemoryStore::heal`].
    pub async fn fail_collection(&self, collection: &str) {
        self.tables.write().await.failing.insert(collection.to_string());
    }

    pub async fn heal(&self) {
        self.tables.write().await.failing.clear();
    }

    pub async fn route_coordinates(&self, route_id: &str) -> Vec<RoutePointRecord> {
        self.tables
            .read()
            .await
            .routes
            .iter()
            .find(|route| route.id == route_id)
            .map(|route| route.route_coordinates.clone())
            .unwrap_or_default()
    }

    fn check(tables: &Tables, collection: &str) -> Result<()> {
        if tables.failing.contains(collection) {
            return Err(TrackerError::store(collection, "collection unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn fetch_routes(&self) -> Result<Vec<RouteRecord>> {
        let tables = self.tables.read().await;
        Self::check(&tables, "routes")?;
        Ok(tables.routes.clone())
    }

    async fn fetch_stages(&self) -> Result<Vec<StageRecord>> {
        let tables = self.tables.read().await;
        Self::check(&tables, "stages")?;
        Ok(tables.stages.clone())
    }

    async fn fetch_vehicles(&self) -> Result<Vec<VehicleRecord>> {
        let tables = self.tables.read().await;
        Self::check(&tables, "vehicles")?;
        Ok(tables.vehicles.clone())
    }

    async fn replace_route_coordinates(
        &self,
        route_id: &str,
        points: &[RoutePointRecord],
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        Self::check(&tables, "route_coordinates")?;
        let route = tables
            .routes
            .iter_mut()
            .find(|route| route.id == route_id)
            .ok_or_else(|| TrackerError::not_found("route", route_id))?;
        route.route_coordinates = points.to_vec();
        Ok(())
    }
}

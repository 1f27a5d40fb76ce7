use crate::domain::model::{RoutePointRecord, RouteRecord, StageRecord, VehicleRecord};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Collection-style access to the persisted routes, stages and vehicles.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn fetch_routes(&self) -> Result<Vec<RouteRecord>>;
    async fn fetch_stages(&self) -> Result<Vec<StageRecord>>;
    async fn fetch_vehicles(&self) -> Result<Vec<VehicleRecord>>;

    /// Replaces every stored geometry point of `route_id`.
    async fn replace_route_coordinates(
        &self,
        route_id: &str,
        points: &[RoutePointRecord],
    ) -> Result<()>;
}

/// Origin or destination of a directions query.
#[derive(Debug, Clone, PartialEq)]
pub enum Waypoint {
    Coordinate(crate::domain::model::Coordinate),
    Place(String),
}

impl Waypoint {
    pub fn to_query_value(&self) -> String {
        match self {
            Waypoint::Coordinate(coordinate) => coordinate.to_query_value(),
            Waypoint::Place(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionsRequest {
    pub origin: Waypoint,
    pub destination: Waypoint,
}

/// Third-party turn-by-turn directions.
#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Synchronous credential check; `false` means no request is attempted.
    fn is_available(&self) -> bool;

    /// Returns the encoded overview polyline of the first route.
    async fn directions(&self, request: &DirectionsRequest) -> Result<String>;
}

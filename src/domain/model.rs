use crate::core::congestion::Congestion;
use crate::utils::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};

/// Native precision of the encoded polyline format (1e-5 degrees).
pub const POLYLINE_PRECISION: f64 = 1e5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Builds a coordinate, rejecting anything outside the WGS84 range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        crate::utils::validation::validate_coordinate(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Rounds both axes to the polyline format's 1e-5 grid.
    pub fn quantized(&self) -> Self {
        Self {
            latitude: (self.latitude * POLYLINE_PRECISION).round() / POLYLINE_PRECISION,
            longitude: (self.longitude * POLYLINE_PRECISION).round() / POLYLINE_PRECISION,
        }
    }

    pub fn midpoint(&self, other: &Coordinate) -> Coordinate {
        Coordinate {
            latitude: (self.latitude + other.latitude) / 2.0,
            longitude: (self.longitude + other.longitude) / 2.0,
        }
    }

    /// `"lat,lng"` as expected by the directions provider.
    pub fn to_query_value(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    pub id: String,
    pub route_id: String,
    pub name: String,
    pub location: Coordinate,
    pub congestion: Congestion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub id: String,
    pub route_id: String,
    pub plate_number: String,
    pub capacity: u32,
    pub available: u32,
    pub location: Option<Coordinate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutePoint {
    pub coordinate: Coordinate,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub id: String,
    pub name: String,
    pub start_label: String,
    pub end_label: String,
    pub start: Option<Coordinate>,
    pub end: Option<Coordinate>,
    pub fare_amount: f64,
    pub estimated_minutes: f64,
    pub description: Option<String>,
    pub distance: Option<f64>,
    pub stored_points: Vec<RoutePoint>,
}

/// A route merged with its stages, vehicles and aggregate congestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteView {
    pub route: Route,
    /// Stored geometry ordered by explicit point order.
    pub stored_path: Vec<Coordinate>,
    /// Stages in persisted order.
    pub stages: Vec<Stage>,
    pub vehicles: Vec<Vehicle>,
    pub congestion: Congestion,
}

impl Route {
    pub fn fare_label(&self) -> String {
        crate::utils::format::format_fare(self.fare_amount)
    }
}

impl RouteView {
    pub fn id(&self) -> &str {
        &self.route.id
    }

    pub fn stage_coordinates(&self) -> Vec<Coordinate> {
        self.stages.iter().map(|stage| stage.location).collect()
    }

    pub fn vehicle(&self, vehicle_id: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|vehicle| vehicle.id == vehicle_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PathSource {
    Provider,
    StoredGeometry,
    StageChain,
    None,
}

impl std::fmt::Display for PathSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PathSource::Provider => "provider",
            PathSource::StoredGeometry => "stored-geometry",
            PathSource::StageChain => "stage-chain",
            PathSource::None => "none",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPath {
    pub source: PathSource,
    pub points: Vec<Coordinate>,
}

impl ResolvedPath {
    /// Consecutive duplicate points are collapsed.
    pub fn new(source: PathSource, mut points: Vec<Coordinate>) -> Self {
        points.dedup();
        if points.is_empty() {
            return Self::none();
        }
        Self { source, points }
    }

    pub fn none() -> Self {
        Self {
            source: PathSource::None,
            points: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn status(&self) -> RouteStatus {
        match self.source {
            PathSource::Provider => RouteStatus::Loaded,
            _ => RouteStatus::Basic,
        }
    }
}

/// Non-blocking indicator shown next to the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RouteStatus {
    Loaded,
    Basic,
}

impl RouteStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RouteStatus::Loaded => "route loaded",
            RouteStatus::Basic => "basic route",
        }
    }
}

// Raw rows as returned by the store.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePointRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub point_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub start_location: String,
    #[serde(default)]
    pub end_location: String,
    #[serde(default)]
    pub start_lat: Option<f64>,
    #[serde(default)]
    pub start_lng: Option<f64>,
    #[serde(default)]
    pub end_lat: Option<f64>,
    #[serde(default)]
    pub end_lng: Option<f64>,
    #[serde(default)]
    pub fare_amount: f64,
    #[serde(default)]
    pub estimated_time: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub route_coordinates: Vec<RoutePointRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: String,
    pub route_id: String,
    pub name: String,
    #[serde(alias = "location_latitude")]
    pub latitude: f64,
    #[serde(alias = "location_longitude")]
    pub longitude: f64,
    #[serde(default)]
    pub congestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub id: String,
    pub route_id: String,
    #[serde(default)]
    pub plate_number: String,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub available: u32,
    #[serde(default, alias = "location_latitude")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "location_longitude")]
    pub longitude: Option<f64>,
}

fn optional_pair(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Coordinate>> {
    match (latitude, longitude) {
        (Some(lat), Some(lng)) => Coordinate::new(lat, lng).map(Some),
        _ => Ok(None),
    }
}

impl TryFrom<RouteRecord> for Route {
    type Error = TrackerError;

    fn try_from(record: RouteRecord) -> Result<Self> {
        let start = optional_pair(record.start_lat, record.start_lng)?;
        let end = optional_pair(record.end_lat, record.end_lng)?;
        let stored_points = record
            .route_coordinates
            .into_iter()
            .map(|point| {
                Ok(RoutePoint {
                    coordinate: Coordinate::new(point.latitude, point.longitude)?,
                    order: point.point_order,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Route {
            id: record.id,
            name: record.name,
            start_label: record.start_location,
            end_label: record.end_location,
            start,
            end,
            fare_amount: record.fare_amount,
            estimated_minutes: record.estimated_time,
            description: record.description,
            distance: record.distance,
            stored_points,
        })
    }
}

impl TryFrom<StageRecord> for Stage {
    type Error = TrackerError;

    fn try_from(record: StageRecord) -> Result<Self> {
        Ok(Stage {
            location: Coordinate::new(record.latitude, record.longitude)?,
            congestion: Congestion::parse(record.congestion.as_deref().unwrap_or_default()),
            id: record.id,
            route_id: record.route_id,
            name: record.name,
        })
    }
}

impl TryFrom<VehicleRecord> for Vehicle {
    type Error = TrackerError;

    fn try_from(record: VehicleRecord) -> Result<Self> {
        Ok(Vehicle {
            location: optional_pair(record.latitude, record.longitude)?,
            id: record.id,
            route_id: record.route_id,
            plate_number: record.plate_number,
            capacity: record.capacity,
            available: record.available,
        })
    }
}

use crate::adapters::directions::GoogleDirectionsClient;
use crate::adapters::rest_store::RestStore;
use crate::config::toml_config::{MapConfig, TrackerConfig};
use crate::core::aggregator::RouteAggregator;
use crate::core::eta::EtaEstimator;
use crate::core::geometry::{self, BoundingRegion};
use crate::core::resolver::{GeometryResolver, Resolution};
use crate::core::tracker::{self, SessionHandle, SessionServices};
use crate::domain::model::{ResolvedPath, RoutePointRecord, RouteView};
use crate::domain::ports::{DirectionsProvider, DirectionsRequest, RouteStore, Waypoint};
use crate::utils::error::{not_found_to_none, Result, TrackerError};
use crate::utils::validation::Validate;
use std::collections::HashMap;
use std::sync::Arc;

/// Entry point tying the store, the directions provider and live tracking
/// together.
pub struct TrackerEngine<S: RouteStore, P: DirectionsProvider> {
    aggregator: RouteAggregator<S>,
    resolver: GeometryResolver<P>,
    estimator: EtaEstimator,
    config: TrackerConfig,
}

impl TrackerEngine<RestStore, GoogleDirectionsClient> {
    /// Engine over the HTTP store and directions API named in `config`.
    pub fn from_config(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let store = RestStore::new(config.store.clone())?;
        let provider = GoogleDirectionsClient::new(config.directions.clone())?;
        if !provider.is_available() {
            tracing::warn!("No directions API key configured, routes will use stored geometry");
        }
        Self::new(Arc::new(store), Arc::new(provider), config)
    }
}

impl<S: RouteStore + 'static, P: DirectionsProvider + 'static> TrackerEngine<S, P> {
    pub fn new(store: Arc<S>, provider: Arc<P>, config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        let estimator = EtaEstimator::new(config.eta.clone())?;
        Ok(Self {
            aggregator: RouteAggregator::new(store),
            resolver: GeometryResolver::new(provider),
            estimator,
            config,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn map_config(&self) -> &MapConfig {
        &self.config.map
    }

    pub fn estimator(&self) -> &EtaEstimator {
        &self.estimator
    }

    pub async fn resolve_route(&self, route_id: &str) -> Result<RouteView> {
        self.aggregator.resolve_route(route_id).await
    }

    /// Like [`TrackerEngine::resolve_route`], but an unknown route is `None`.
    pub async fn find_route(&self, route_id: &str) -> Result<Option<RouteView>> {
        not_found_to_none(self.aggregator.resolve_route(route_id).await)
    }

    pub async fn resolve_all(&self) -> Result<HashMap<String, RouteView>> {
        self.aggregator.resolve_all().await
    }

    pub async fn resolve_geometry(&self, view: &RouteView) -> ResolvedPath {
        self.resolver.resolve(view).await
    }

    pub async fn resolve_geometry_detailed(&self, view: &RouteView) -> Resolution {
        self.resolver.resolve_detailed(view).await
    }

    pub async fn require_geometry(&self, view: &RouteView) -> Result<ResolvedPath> {
        self.resolver.require(view).await
    }

    /// Region framing `path`, or the configured default for an empty path.
    pub fn bounding_region(&self, path: &ResolvedPath) -> BoundingRegion {
        geometry::bounding_region(path, &self.config.map)
            .unwrap_or_else(|| BoundingRegion::default_region(&self.config.map))
    }

    /// Fetches directions between the route's start and end coordinates and
    /// stores them as the route's geometry. Returns the number of points
    /// written.
    pub async fn publish_provider_path(&self, route_id: &str) -> Result<usize> {
        let view = self.aggregator.resolve_route(route_id).await?;

        if !self.resolver.provider().is_available() {
            return Err(TrackerError::ProviderUnavailable {
                reason: "no directions credential configured".to_string(),
            });
        }
        let (start, end) = view
            .route
            .start
            .zip(view.route.end)
            .ok_or_else(|| TrackerError::not_found("route start/end coordinates", route_id))?;

        let request = DirectionsRequest {
            origin: Waypoint::Coordinate(start),
            destination: Waypoint::Coordinate(end),
        };
        let points = self.resolver.fetch_provider_path(&request).await?;
        if points.is_empty() {
            return Err(TrackerError::GeometryExhausted {
                route_id: route_id.to_string(),
                attempts: vec!["provider (route endpoints): no points".to_string()],
            });
        }

        let records: Vec<RoutePointRecord> = points
            .iter()
            .enumerate()
            .map(|(index, point)| RoutePointRecord {
                latitude: point.latitude,
                longitude: point.longitude,
                point_order: index as i64,
            })
            .collect();

        self.aggregator
            .store()
            .replace_route_coordinates(route_id, &records)
            .await?;

        tracing::info!(route_id, points = records.len(), "✅ Published provider path");
        Ok(records.len())
    }

    /// Starts a live-tracking session for `vehicle_id`.
    pub fn start_tracking(&self, vehicle_id: impl Into<String>) -> SessionHandle {
        let services = SessionServices {
            aggregator: self.aggregator.clone(),
            resolver: self.resolver.clone(),
            estimator: self.estimator.clone(),
            tracking: self.config.tracking.clone(),
        };
        tracker::spawn_session(services, vehicle_id.into())
    }

    pub async fn stop_tracking(&self, handle: SessionHandle) -> Result<()> {
        handle.stop().await
    }
}

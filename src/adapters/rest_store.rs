use crate::config::toml_config::StoreConfig;
use crate::domain::model::{RoutePointRecord, RouteRecord, StageRecord, VehicleRecord};
use crate::domain::ports::RouteStore;
use crate::utils::error::{Result, TrackerError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;

const ROUTE_SELECT: &str = "*,route_coordinates(latitude,longitude,point_order)";

#[derive(Debug, Serialize)]
struct RoutePointRow<'a> {
    route_id: &'a str,
    latitude: f64,
    longitude: f64,
    point_order: i64,
}

/// Store backed by a PostgREST-style HTTP API (`/routes`, `/stages`,
/// `/vehicles`, `/route_coordinates`).
pub struct RestStore {
    client: Client,
    config: StoreConfig,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    fn url(&self, collection: &str) -> String {
        format!("{}/{}", self.config.endpoint.trim_end_matches('/'), collection)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => request
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key)),
            _ => request,
        }
    }

    async fn send(&self, collection: &str, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| TrackerError::store(collection, e))?;

        tracing::debug!(collection, "Store response status: {}", response.status());
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::store(
                collection,
                format!("HTTP {}: {}", status.as_u16(), body),
            ));
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(&self, collection: &str, select: &str) -> Result<Vec<T>> {
        let request = self
            .client
            .get(self.url(collection))
            .query(&[("select", select)]);
        let response = self.send(collection, request).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| TrackerError::store(collection, e))
    }
}

#[async_trait]
impl RouteStore for RestStore {
    async fn fetch_routes(&self) -> Result<Vec<RouteRecord>> {
        self.fetch("routes", ROUTE_SELECT).await
    }

    async fn fetch_stages(&self) -> Result<Vec<StageRecord>> {
        self.fetch("stages", "*").await
    }

    async fn fetch_vehicles(&self) -> Result<Vec<VehicleRecord>> {
        self.fetch("vehicles", "*").await
    }

    async fn replace_route_coordinates(
        &self,
        route_id: &str,
        points: &[RoutePointRecord],
    ) -> Result<()> {
        let collection = "route_coordinates";
        let filter = format!("eq.{}", route_id);

        let delete = self
            .client
            .delete(self.url(collection))
            .query(&[("route_id", filter.as_str())]);
        self.send(collection, delete).await?;

        if points.is_empty() {
            return Ok(());
        }

        let rows: Vec<RoutePointRow<'_>> = points
            .iter()
            .map(|point| RoutePointRow {
                route_id,
                latitude: point.latitude,
                longitude: point.longitude,
                point_order: point.point_order,
            })
            .collect();
        let insert = self
            .client
            .post(self.url(collection))
            .header("Content-Type", "application/json")
            .header("Prefer", "return=minimal")
            .json(&rows);
        self.send(collection, insert).await?;

        tracing::info!(route_id, points = points.len(), "Replaced stored route geometry");
        Ok(())
    }
}

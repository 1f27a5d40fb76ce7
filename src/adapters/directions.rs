use crate::config::toml_config::DirectionsConfig;
use crate::domain::ports::{DirectionsProvider, DirectionsRequest};
use crate::utils::error::{Result, TrackerError};
use crate::utils::validation;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    overview_polyline: OverviewPolyline,
}

#[derive(Debug, Deserialize)]
struct OverviewPolyline {
    points: String,
}

/// Google-style directions API client.
pub struct GoogleDirectionsClient {
    client: Client,
    config: DirectionsConfig,
}

impl GoogleDirectionsClient {
    pub fn new(config: DirectionsConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn with_client(client: Client, config: DirectionsConfig) -> Self {
        Self { client, config }
    }
}

/// Connection and timeout failures mean the provider is unreachable; anything
/// else is reported as a bad response.
fn classify(error: reqwest::Error) -> TrackerError {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        TrackerError::ProviderUnavailable {
            reason: error.to_string(),
        }
    } else {
        TrackerError::HttpError(error)
    }
}

#[async_trait]
impl DirectionsProvider for GoogleDirectionsClient {
    fn is_available(&self) -> bool {
        validation::is_usable_credential(self.config.api_key.as_deref())
    }

    async fn directions(&self, request: &DirectionsRequest) -> Result<String> {
        let key = self.config.api_key.as_deref().unwrap_or_default();
        let origin = request.origin.to_query_value();
        let destination = request.destination.to_query_value();

        tracing::debug!(
            endpoint = %self.config.endpoint,
            origin = %origin,
            destination = %destination,
            mode = %self.config.mode,
            "Requesting directions"
        );

        let response = self
            .client
            .get(&self.config.endpoint)
            .query(&[
                ("origin", origin.as_str()),
                ("destination", destination.as_str()),
                ("mode", self.config.mode.as_str()),
                ("key", key),
            ])
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        tracing::debug!("Directions response status: {}", status);
        if !status.is_success() {
            return Err(TrackerError::ProviderStatus {
                status: format!("HTTP {}", status.as_u16()),
            });
        }

        let body: DirectionsResponse = response.json().await?;
        if body.status != "OK" {
            if let Some(message) = &body.error_message {
                tracing::debug!(status = %body.status, message = %message, "Directions provider declined");
            }
            return Err(TrackerError::ProviderStatus {
                status: body.status,
            });
        }

        body.routes
            .into_iter()
            .next()
            .map(|route| route.overview_polyline.points)
            .ok_or_else(|| TrackerError::ProviderStatus {
                status: "OK without routes".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> DirectionsConfig {
        DirectionsConfig {
            api_key: api_key.map(str::to_string),
            ..DirectionsConfig::default()
        }
    }

    #[test]
    fn test_availability_follows_credential() {
        assert!(GoogleDirectionsClient::new(config(Some("abc123"))).unwrap().is_available());
        assert!(!GoogleDirectionsClient::new(config(None)).unwrap().is_available());
        assert!(!GoogleDirectionsClient::new(config(Some(""))).unwrap().is_available());
        assert!(!GoogleDirectionsClient::new(config(Some("${MAPS_API_KEY}")))
            .unwrap()
            .is_available());
    }

    #[test]
    fn test_response_shape() {
        let body = r#"{
            "status": "OK",
            "routes": [{"overview_polyline": {"points": "_p~iF~ps|U"}, "summary": "A104"}]
        }"#;
        let parsed: DirectionsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.routes[0].overview_polyline.points, "_p~iF~ps|U");

        let denied: DirectionsResponse =
            serde_json::from_str(r#"{"status": "REQUEST_DENIED", "error_message": "bad key"}"#)
                .unwrap();
        assert!(denied.routes.is_empty());
    }
}

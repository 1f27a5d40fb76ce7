use crate::core::congestion::Congestion;
use crate::domain::model::Coordinate;
use crate::utils::error::{Result, TrackerError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_DIRECTIONS_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/directions/json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub store: StoreConfig,
    #[serde(default)]
    pub directions: DirectionsConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub eta: EtaConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(10))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionsConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub mode: String,
    pub timeout_seconds: Option<u64>,
}

impl Default for DirectionsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_DIRECTIONS_ENDPOINT.to_string(),
            api_key: None,
            mode: "driving".to_string(),
            timeout_seconds: None,
        }
    }
}

impl DirectionsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(10))
    }

    pub fn has_credential(&self) -> bool {
        validation::is_usable_credential(self.api_key.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub position_tick_ms: u64,
    pub eta_tick_ms: u64,
    /// Minutes removed from the remaining ETA on every ETA tick.
    pub eta_step_minutes: f64,
    /// Auto-follow only recentres when the target moved more than this.
    pub follow_threshold_degrees: f64,
    pub follow_span_degrees: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            position_tick_ms: 3000,
            eta_tick_ms: 6000,
            eta_step_minutes: 0.1,
            follow_threshold_degrees: 0.001,
            follow_span_degrees: 0.02,
        }
    }
}

impl TrackingConfig {
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_tick_ms)
    }

    pub fn eta_interval(&self) -> Duration {
        Duration::from_millis(self.eta_tick_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CongestionMultipliers {
    pub unknown: f64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub severe: f64,
}

impl Default for CongestionMultipliers {
    fn default() -> Self {
        Self {
            unknown: 1.0,
            low: 1.0,
            medium: 1.2,
            high: 1.5,
            severe: 2.0,
        }
    }
}

impl CongestionMultipliers {
    pub fn for_level(&self, level: Congestion) -> f64 {
        match level {
            Congestion::Unknown => self.unknown,
            Congestion::Low => self.low,
            Congestion::Medium => self.medium,
            Congestion::High => self.high,
            Congestion::Severe => self.severe,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaConfig {
    pub speed_kmh: f64,
    pub traffic_multiplier: f64,
    pub congestion_multipliers: CongestionMultipliers,
}

impl Default for EtaConfig {
    fn default() -> Self {
        Self {
            speed_kmh: 25.0,
            traffic_multiplier: 1.0,
            congestion_multipliers: CongestionMultipliers::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub padding_factor: f64,
    pub min_span_degrees: f64,
    pub default_center: Coordinate,
    pub default_span_degrees: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            padding_factor: 1.3,
            min_span_degrees: 0.01,
            default_center: Coordinate {
                latitude: -1.286389,
                longitude: 36.817223,
            },
            default_span_degrees: 0.03,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: LogFormat,
}

impl TrackerConfig {
    /// Configuration with a store endpoint and every other section defaulted.
    pub fn with_store(endpoint: impl Into<String>) -> Self {
        Self {
            store: StoreConfig {
                endpoint: endpoint.into(),
                api_key: None,
                timeout_seconds: None,
            },
            directions: DirectionsConfig::default(),
            tracking: TrackingConfig::default(),
            eta: EtaConfig::default(),
            map: MapConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(TrackerError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| TrackerError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are
    /// left untouched.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| TrackerError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("store.endpoint", &self.store.endpoint)?;
        validation::validate_url("directions.endpoint", &self.directions.endpoint)?;
        validation::validate_non_empty_string("directions.mode", &self.directions.mode)?;

        validation::validate_positive_number(
            "tracking.position_tick_ms",
            self.tracking.position_tick_ms,
            1,
        )?;
        validation::validate_positive_number("tracking.eta_tick_ms", self.tracking.eta_tick_ms, 1)?;
        validation::validate_positive_float(
            "tracking.eta_step_minutes",
            self.tracking.eta_step_minutes,
        )?;
        validation::validate_range(
            "tracking.follow_threshold_degrees",
            self.tracking.follow_threshold_degrees,
            0.0,
            1.0,
        )?;
        validation::validate_positive_float(
            "tracking.follow_span_degrees",
            self.tracking.follow_span_degrees,
        )?;

        validation::validate_positive_float("eta.speed_kmh", self.eta.speed_kmh)?;
        validation::validate_positive_float("eta.traffic_multiplier", self.eta.traffic_multiplier)?;
        let multipliers = &self.eta.congestion_multipliers;
        for (field, value) in [
            ("eta.congestion_multipliers.unknown", multipliers.unknown),
            ("eta.congestion_multipliers.low", multipliers.low),
            ("eta.congestion_multipliers.medium", multipliers.medium),
            ("eta.congestion_multipliers.high", multipliers.high),
            ("eta.congestion_multipliers.severe", multipliers.severe),
        ] {
            validation::validate_positive_float(field, value)?;
        }

        validation::validate_range("map.padding_factor", self.map.padding_factor, 1.0, 10.0)?;
        validation::validate_positive_float("map.min_span_degrees", self.map.min_span_degrees)?;
        validation::validate_positive_float(
            "map.default_span_degrees",
            self.map.default_span_degrees,
        )?;
        validation::validate_coordinate(
            self.map.default_center.latitude,
            self.map.default_center.longitude,
        )?;

        if let Some(level) = &self.logging.level {
            let valid_levels = ["trace", "debug", "info", "warn", "error"];
            if !valid_levels.contains(&level.as_str()) {
                return Err(TrackerError::InvalidConfigValueError {
                    field: "logging.level".to_string(),
                    value: level.clone(),
                    reason: format!("Valid levels: {}", valid_levels.join(", ")),
                });
            }
        }

        Ok(())
    }
}

impl Validate for TrackerConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

use crate::config::toml_config::EtaConfig;
use crate::core::congestion::Congestion;
use crate::core::geometry;
use crate::domain::model::{Coordinate, RouteView};
use crate::utils::error::Result;
use crate::utils::{format, validation};
use serde::Serialize;
use std::fmt;

/// Minutes of travel per kilometre between consecutive stages.
pub const STAGE_MINUTES_PER_KM: f64 = 2.0;

/// `round((distance_km / speed_kmh) * traffic_multiplier * 60)`.
///
/// `speed_kmh` must be positive; callers validate it before reaching here.
pub fn estimate_minutes(distance_meters: f64, speed_kmh: f64, traffic_multiplier: f64) -> u32 {
    debug_assert!(speed_kmh > 0.0, "speed_kmh must be positive");
    let hours = (distance_meters / 1000.0 / speed_kmh) * traffic_multiplier;
    (hours * 60.0).round().max(0.0) as u32
}

/// ETA estimator bound to validated configuration constants.
#[derive(Debug, Clone)]
pub struct EtaEstimator {
    config: EtaConfig,
}

impl EtaEstimator {
    pub fn new(config: EtaConfig) -> Result<Self> {
        validation::validate_positive_float("eta.speed_kmh", config.speed_kmh)?;
        validation::validate_positive_float("eta.traffic_multiplier", config.traffic_multiplier)?;
        Ok(Self { config })
    }

    pub fn multiplier_for(&self, congestion: Congestion) -> f64 {
        self.config.traffic_multiplier * self.config.congestion_multipliers.for_level(congestion)
    }

    pub fn minutes_for(&self, distance_meters: f64, congestion: Congestion) -> u32 {
        estimate_minutes(
            distance_meters,
            self.config.speed_kmh,
            self.multiplier_for(congestion),
        )
    }

    /// Minutes left when travelling `points` from `index` to the end.
    pub fn remaining_minutes(&self, points: &[Coordinate], index: usize, congestion: Congestion) -> u32 {
        self.minutes_for(geometry::remaining_meters(points, index), congestion)
    }
}

/// Travel time from one stage to the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageLeg {
    pub from_stage: String,
    pub to_stage: String,
    pub distance_meters: f64,
    pub minutes: u32,
}

impl fmt::Display for StageLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} → {}: {}, {}",
            self.from_stage,
            self.to_stage,
            format::format_distance(self.distance_meters),
            format::format_duration(self.minutes)
        )
    }
}

pub fn stage_travel_minutes(from: &Coordinate, to: &Coordinate) -> u32 {
    (geometry::haversine_distance(from, to) * STAGE_MINUTES_PER_KM).round() as u32
}

impl RouteView {
    /// One leg per consecutive pair of stages, in persisted order.
    pub fn stage_legs(&self) -> Vec<StageLeg> {
        self.stages
            .windows(2)
            .map(|pair| StageLeg {
                from_stage: pair[0].name.clone(),
                to_stage: pair[1].name.clone(),
                distance_meters: geometry::distance_meters(&pair[0].location, &pair[1].location),
                minutes: stage_travel_minutes(&pair[0].location, &pair[1].location),
            })
            .collect()
    }
}

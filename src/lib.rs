pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{directions::GoogleDirectionsClient, memory_store::MemoryStore, rest_store::RestStore};
pub use config::TrackerConfig;
pub use crate::core::{
    engine::TrackerEngine,
    session::{TrackingSnapshot, TrackingState},
    tracker::SessionHandle,
};
pub use domain::model::{Coordinate, PathSource, ResolvedPath, RouteStatus, RouteView};
pub use utils::error::{Result, TrackerError};

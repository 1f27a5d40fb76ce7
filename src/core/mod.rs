pub mod aggregator;
pub mod congestion;
pub mod engine;
pub mod eta;
pub mod geometry;
pub mod polyline;
pub mod resolver;
pub mod session;
pub mod tracker;

pub use crate::domain::model::{Coordinate, ResolvedPath, RouteView};
pub use crate::domain::ports::{DirectionsProvider, RouteStore};
pub use crate::utils::error::Result;

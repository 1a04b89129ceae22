//! Common types and utilities shared across all geoentity services.

pub mod error;
pub mod time;

pub use error::{GeoError, GeoResult};
pub use time::parse_publish_date;

/// Spatial reference identifier for all stored geometry (WGS84 geographic).
pub const SRID_WGS84: i32 = 4326;

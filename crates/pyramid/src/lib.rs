//! Geoentity pyramid generation.
//!
//! Rebuilds a ladder of progressively simplified geometry levels per
//! source layer for fast rendering at varying zoom levels. Level 0 is
//! full precision; each coarser level is derived from the one below it
//! by topology-preserving simplification, grid snapping, and repair.

pub mod builder;

pub use builder::{grid_size_for, PyramidBuilder, LEVEL_COUNT, TOLERANCES};

//! Pyramid builder: cascading simplification across the tolerance ladder.
//!
//! A rebuild is restartable: it deletes every existing level for the
//! source, then regenerates all of them in sequence. Levels have a hard
//! read-after-write dependency (level N reads only rows committed at
//! level N-1), so there is no parallelism across levels. Each level
//! commits independently; an error abandons the remaining levels and
//! leaves the already-committed ones in place.

use tokio::sync::mpsc;
use tracing::{error, info};

use geoentity_common::{GeoError, GeoResult};
use storage::Store;

/// Simplification tolerance ladder, finest to coarsest. Level N (N >= 1)
/// uses `TOLERANCES[N - 1]`; level 0 is full precision.
pub const TOLERANCES: [f64; 14] = [
    0.00001, 0.00002, 0.00004, 0.00008, 0.00016, 0.00032, 0.00064, 0.00128, 0.00256, 0.00512,
    0.01024, 0.02048, 0.04096, 0.08192,
];

/// Total level count including the full-precision level 0.
pub const LEVEL_COUNT: usize = TOLERANCES.len() + 1;

/// Grid-snap cell size for a simplification tolerance.
///
/// Step function of the tolerance magnitude; each threshold applies on
/// strict excess, so a tolerance of exactly 1e-4 still snaps at 1e-5.
pub fn grid_size_for(tolerance: f64) -> f64 {
    let mut grid_size = 0.000001;
    if tolerance > 0.00001 {
        grid_size = 0.00001;
    }
    if tolerance > 0.0001 {
        grid_size = 0.0001;
    }
    if tolerance > 0.001 {
        grid_size = 0.001;
    }
    grid_size
}

/// Rebuilds the pyramid level ladder for one source layer.
pub struct PyramidBuilder {
    store: Store,
}

impl PyramidBuilder {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Rebuild all levels for `source_id`, streaming progress lines.
    ///
    /// The returned receiver yields one ordered line per level plus
    /// sub-steps; on failure the final line reports the error and no
    /// further levels are generated. Committed levels stay in the store.
    pub fn rebuild(&self, source_id: i64, is_polygon: bool) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(32);
        let store = self.store.clone();

        tokio::spawn(async move {
            if let Err(e) = run_rebuild(&store, source_id, is_polygon, &tx).await {
                error!(source_id, error = %e, "Pyramid rebuild failed");
                let _ = tx.send(format!("ERROR: pyramid rebuild aborted: {}", e)).await;
            }
        });

        rx
    }
}

async fn run_rebuild(
    store: &Store,
    source_id: i64,
    is_polygon: bool,
    tx: &mpsc::Sender<String>,
) -> GeoResult<()> {
    send(tx, format!(
        "Rebuilding pyramid for source {} ({} levels)",
        source_id, LEVEL_COUNT
    ))
    .await;

    let removed = store
        .delete_pyramid_levels(source_id)
        .await
        .map_err(|e| at_level(0, e))?;
    send(tx, format!("Removed {} existing pyramid rows", removed)).await;

    let seeded = store
        .seed_pyramid_base(source_id, is_polygon)
        .await
        .map_err(|e| at_level(0, e))?;
    send(tx, format!("Level 0 (full precision): {} rows", seeded)).await;
    info!(source_id, rows = seeded, "Pyramid base level seeded");

    for (index, tolerance) in TOLERANCES.iter().enumerate() {
        let level = (index + 1) as i32;
        let grid_size = grid_size_for(*tolerance);

        send(tx, format!(
            "Level {}: tolerance {}, grid size {}",
            level, tolerance, grid_size
        ))
        .await;

        let rows = store
            .derive_pyramid_level(source_id, level, *tolerance, grid_size, is_polygon)
            .await
            .map_err(|e| at_level(level, e))?;

        send(tx, format!("Level {}: {} rows", level, rows)).await;
        info!(source_id, level, rows, "Pyramid level generated");
    }

    send(tx, format!("Pyramid rebuild complete for source {}", source_id)).await;
    Ok(())
}

/// Receiver hang-up is not an error worth aborting the build for.
async fn send(tx: &mpsc::Sender<String>, line: String) {
    let _ = tx.send(line).await;
}

fn at_level(level: i32, err: GeoError) -> GeoError {
    GeoError::Pyramid {
        level,
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_has_fifteen_levels_including_full_precision() {
        assert_eq!(TOLERANCES.len(), 14);
        assert_eq!(LEVEL_COUNT, 15);
    }

    #[test]
    fn ladder_is_strictly_increasing_and_doubling() {
        for pair in TOLERANCES.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!((pair[1] / pair[0] - 2.0).abs() < 1e-9);
        }
        assert_eq!(TOLERANCES[0], 0.00001);
        assert_eq!(TOLERANCES[13], 0.08192);
    }

    #[test]
    fn grid_size_steps_with_tolerance() {
        assert_eq!(grid_size_for(0.00001), 0.000001);
        assert_eq!(grid_size_for(0.00002), 0.00001);
        assert_eq!(grid_size_for(0.0003), 0.0001);
        assert_eq!(grid_size_for(0.01024), 0.001);
        assert_eq!(grid_size_for(0.08192), 0.001);
    }

    #[test]
    fn grid_size_thresholds_are_strict() {
        // Exactly at a threshold the smaller cell still applies.
        assert_eq!(grid_size_for(0.0001), 0.00001);
        assert_eq!(grid_size_for(0.001), 0.0001);
        assert_eq!(grid_size_for(0.00001), 0.000001);
    }

    #[test]
    fn every_ladder_entry_maps_to_a_grid_size() {
        let expected = [
            0.000001, 0.00001, 0.00001, 0.00001, 0.0001, 0.0001, 0.0001, 0.001, 0.001, 0.001,
            0.001, 0.001, 0.001, 0.001,
        ];
        for (tolerance, want) in TOLERANCES.iter().zip(expected) {
            assert_eq!(grid_size_for(*tolerance), want, "tolerance {}", tolerance);
        }
    }
}

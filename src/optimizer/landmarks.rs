//! Landmark Resolution after pose graph optimization.
//!
//! Every local map holds a frozen snapshot of its landmarks in local
//! coordinates. Re-projecting the snapshots through the (optimized) local map
//! poses gives the new global coordinates. A landmark shared by several local
//! maps ends up with the estimate of the last one in creation order.

use tracing::debug;

use crate::map::WorldMap;

/// Recompute the global coordinates of every snapshotted landmark.
///
/// Returns the number of coordinate updates performed.
pub fn resolve_landmarks(map: &mut WorldMap) -> usize {
    let updates: Vec<_> = map
        .local_maps()
        .iter()
        .flat_map(|local_map| {
            let local_map_to_world = *local_map.local_map_to_world();
            local_map.landmarks().iter().map(move |state| {
                (
                    state.landmark,
                    local_map_to_world.transform_point(&state.coordinates_in_local_map),
                )
            })
        })
        .collect();

    let mut updated = 0;
    for (landmark, coordinates) in updates {
        // Destroyed landmarks are skipped
        if map.set_landmark_coordinates(landmark, coordinates).is_ok() {
            updated += 1;
        }
    }

    debug!("Resolved {} landmark coordinates", updated);
    updated
}

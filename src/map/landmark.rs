//! Landmark - A persistent 3D point.
//!
//! Landmarks start out provisional in the WorldMap's window. When a local map
//! is finalized over frames observing them they get attached to it (and a
//! frozen snapshot in local map coordinates is stored in the local map).
//! Landmarks that lose tracking before being attached are discarded.

use nalgebra::Vector3;

use super::types::{FrameId, LandmarkId, LocalMapId};

/// A 3D landmark owned by the WorldMap.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    /// Unique identifier for this Landmark.
    pub id: LandmarkId,

    /// Frame whose observation created this landmark.
    pub origin: FrameId,

    /// Current position in world frame.
    coordinates: Vector3<f64>,

    /// Whether tracking still observes this landmark.
    is_currently_tracked: bool,

    /// Local map the landmark was finalized into. None while provisional.
    local_map: Option<LocalMapId>,
}

impl Landmark {
    pub fn new(id: LandmarkId, origin: FrameId, coordinates: Vector3<f64>) -> Self {
        Self {
            id,
            origin,
            coordinates,
            is_currently_tracked: true,
            local_map: None,
        }
    }

    pub fn coordinates(&self) -> &Vector3<f64> {
        &self.coordinates
    }

    /// Overwrite the world position.
    pub fn reset_coordinates(&mut self, coordinates: Vector3<f64>) {
        self.coordinates = coordinates;
    }

    pub fn is_currently_tracked(&self) -> bool {
        self.is_currently_tracked
    }

    pub fn set_is_currently_tracked(&mut self, tracked: bool) {
        self.is_currently_tracked = tracked;
    }

    pub fn local_map(&self) -> Option<LocalMapId> {
        self.local_map
    }

    pub(crate) fn set_local_map(&mut self, local_map: LocalMapId) {
        self.local_map = Some(local_map);
    }
}

/// Snapshot of a landmark taken when a local map is created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LandmarkState {
    pub landmark: LandmarkId,
    pub coordinates_in_local_map: Vector3<f64>,
}

//! LocalMap - Aggregation of a contiguous run of frames.
//!
//! A local map is the node type of the pose graph. Its frame membership,
//! landmark snapshots and appearance pool are fixed at creation; only its
//! pose changes afterwards (through optimization), and the pose/inverse pair
//! is only writable through [`LocalMap::update`].

use serde::Deserialize;

use crate::geometry::SE3;

use super::frame::Descriptor;
use super::landmark::LandmarkState;
use super::types::{FrameId, LandmarkId, LocalMapId};

/// Configuration for local map creation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LocalMapConfig {
    /// Target minimum number of landmarks contained in a local map.
    /// Local maps below the target are still created.
    pub minimum_number_of_landmarks: usize,
}

impl Default for LocalMapConfig {
    fn default() -> Self {
        Self {
            minimum_number_of_landmarks: 50,
        }
    }
}

/// Loop closure constraint from the owning (query) local map to a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    /// The reference local map.
    pub local_map: LocalMapId,

    /// Spatial relation from query to reference (maps query coordinates into
    /// the reference local map).
    pub relation: SE3,

    /// Scalar information value of the correspondence.
    pub omega: f64,
}

/// A landmark appearance pooled from the aggregated frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Appearance {
    pub landmark: LandmarkId,
    pub descriptor: Descriptor,
}

/// A local map in the WorldMap's chain.
#[derive(Debug, Clone)]
pub struct LocalMap {
    /// Unique identifier for this LocalMap.
    pub id: LocalMapId,

    local_map_to_world: SE3,
    world_to_local_map: SE3,

    root: LocalMapId,
    previous: Option<LocalMapId>,
    next: Option<LocalMapId>,

    /// Anchor frame (the last frame of the aggregated run).
    keyframe: FrameId,

    frames: Vec<FrameId>,
    landmarks: Vec<LandmarkState>,
    appearances: Vec<Appearance>,
    closures: Vec<Closure>,
}

impl LocalMap {
    /// Create a local map posed at its keyframe.
    ///
    /// `root` is None for the first local map of a track, which then becomes
    /// its own root.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: LocalMapId,
        keyframe: FrameId,
        local_map_to_world: SE3,
        root: Option<LocalMapId>,
        previous: Option<LocalMapId>,
        frames: Vec<FrameId>,
        landmarks: Vec<LandmarkState>,
        appearances: Vec<Appearance>,
    ) -> Self {
        Self {
            id,
            local_map_to_world,
            world_to_local_map: local_map_to_world.inverse(),
            root: root.unwrap_or(id),
            previous,
            next: None,
            keyframe,
            frames,
            landmarks,
            appearances,
            closures: Vec::new(),
        }
    }

    pub fn local_map_to_world(&self) -> &SE3 {
        &self.local_map_to_world
    }

    pub fn world_to_local_map(&self) -> &SE3 {
        &self.world_to_local_map
    }

    /// Set the local map pose, recomputing the inverse.
    ///
    /// Contained frames follow through `WorldMap::update_local_map`.
    pub(crate) fn update(&mut self, local_map_to_world: SE3) {
        self.local_map_to_world = local_map_to_world;
        self.world_to_local_map = local_map_to_world.inverse();
    }

    pub fn root(&self) -> LocalMapId {
        self.root
    }

    pub fn previous(&self) -> Option<LocalMapId> {
        self.previous
    }

    pub fn next(&self) -> Option<LocalMapId> {
        self.next
    }

    pub(crate) fn set_next(&mut self, next: LocalMapId) {
        self.next = Some(next);
    }

    pub fn keyframe(&self) -> FrameId {
        self.keyframe
    }

    pub fn frames(&self) -> &[FrameId] {
        &self.frames
    }

    pub fn landmarks(&self) -> &[LandmarkState] {
        &self.landmarks
    }

    pub fn appearances(&self) -> &[Appearance] {
        &self.appearances
    }

    pub fn closures(&self) -> &[Closure] {
        &self.closures
    }

    /// Add a loop closure constraint towards `reference`.
    pub(crate) fn add_closure(&mut self, reference: LocalMapId, query_to_reference: SE3, omega: f64) {
        self.closures.push(Closure {
            local_map: reference,
            relation: query_to_reference,
            omega,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, UnitQuaternion, Vector3};

    fn local_map(id: u64, pose: SE3) -> LocalMap {
        LocalMap::new(
            LocalMapId::new(id),
            FrameId::new(id * 10),
            pose,
            None,
            None,
            vec![FrameId::new(id * 10)],
            Vec::new(),
            Vec::new(),
        )
    }

    #[test]
    fn test_first_local_map_is_own_root() {
        let lm = local_map(3, SE3::identity());
        assert_eq!(lm.root(), LocalMapId::new(3));
        assert_eq!(lm.previous(), None);
        assert_eq!(lm.next(), None);
    }

    #[test]
    fn test_update_keeps_inverse_consistent() {
        let mut lm = local_map(0, SE3::identity());
        lm.update(SE3::new(
            UnitQuaternion::from_euler_angles(0.1, 0.2, -0.7),
            Vector3::new(4.0, -1.0, 2.5),
        ));

        let product = lm.local_map_to_world().compose(lm.world_to_local_map());
        assert_relative_eq!(product.to_matrix(), Matrix4::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_closures_keep_insertion_order() {
        let mut lm = local_map(5, SE3::identity());
        lm.add_closure(LocalMapId::new(1), SE3::identity(), 0.5);
        lm.add_closure(LocalMapId::new(0), SE3::identity(), 1.0);

        let references: Vec<_> = lm.closures().iter().map(|c| c.local_map).collect();
        assert_eq!(references, vec![LocalMapId::new(1), LocalMapId::new(0)]);
        assert_eq!(lm.closures()[0].omega, 0.5);
    }
}

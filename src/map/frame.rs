//! Frame - One sensor sample in the temporal chain.
//!
//! Frames carry the pose estimate supplied by tracking and the point
//! observations made in that sample. Once a run of frames is aggregated into
//! a LocalMap, each frame remembers its pose relative to the local map so
//! that pose graph corrections can be pushed down to the whole trajectory.

use nalgebra::Vector3;

use crate::geometry::SE3;

use super::types::{FrameId, LandmarkId, LocalMapId};

/// Binary appearance descriptor attached to a point observation.
///
/// Only carried through to the local map appearance pool; matching happens
/// in the external place recognition component.
pub type Descriptor = Vec<u8>;

/// A point observation in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePoint {
    /// 3D position in the robot (sensor) frame.
    pub robot_coordinates: Vector3<f64>,

    /// Landmark this observation is associated with, if any.
    pub landmark: Option<LandmarkId>,

    /// Appearance of the observation.
    pub descriptor: Option<Descriptor>,
}

impl FramePoint {
    pub fn new(robot_coordinates: Vector3<f64>) -> Self {
        Self {
            robot_coordinates,
            landmark: None,
            descriptor: None,
        }
    }

    pub fn with_landmark(mut self, landmark: LandmarkId) -> Self {
        self.landmark = Some(landmark);
        self
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.descriptor = Some(descriptor);
        self
    }
}

/// Role of a frame in the chain.
///
/// A frame that anchors a local map stays in the frame chain; the local map
/// itself lives in the WorldMap's local map arena and is reached via the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Plain,
    Anchor(LocalMapId),
}

/// A single frame of the trajectory.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Unique identifier for this Frame.
    pub id: FrameId,

    /// Preceding frame in the temporal chain.
    /// None for the root frame and the first frame after a track break.
    pub previous: Option<FrameId>,

    /// Subsequent frame in the temporal chain.
    pub next: Option<FrameId>,

    /// Depth threshold separating close from far observations.
    pub maximum_depth_close: f64,

    kind: FrameKind,

    robot_to_world: SE3,
    world_to_robot: SE3,

    /// Local map this frame was aggregated into, with the frame pose
    /// expressed in that local map.
    local_map: Option<(LocalMapId, SE3)>,

    points: Vec<FramePoint>,
    points_released: bool,
}

impl Frame {
    pub fn new(
        id: FrameId,
        previous: Option<FrameId>,
        robot_to_world: SE3,
        maximum_depth_close: f64,
    ) -> Self {
        Self {
            id,
            previous,
            next: None,
            maximum_depth_close,
            kind: FrameKind::Plain,
            robot_to_world,
            world_to_robot: robot_to_world.inverse(),
            local_map: None,
            points: Vec::new(),
            points_released: false,
        }
    }

    pub fn robot_to_world(&self) -> &SE3 {
        &self.robot_to_world
    }

    pub fn world_to_robot(&self) -> &SE3 {
        &self.world_to_robot
    }

    /// Set the frame pose, keeping the inverse consistent.
    pub(crate) fn set_robot_to_world(&mut self, robot_to_world: SE3) {
        self.robot_to_world = robot_to_world;
        self.world_to_robot = robot_to_world.inverse();
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Whether this frame anchors a local map.
    pub fn is_keyframe(&self) -> bool {
        matches!(self.kind, FrameKind::Anchor(_))
    }

    pub(crate) fn set_anchor(&mut self, local_map: LocalMapId) {
        self.kind = FrameKind::Anchor(local_map);
    }

    /// Local map containing this frame, if it was aggregated already.
    pub fn local_map(&self) -> Option<LocalMapId> {
        self.local_map.map(|(id, _)| id)
    }

    pub fn frame_to_local_map(&self) -> Option<&SE3> {
        self.local_map.as_ref().map(|(_, pose)| pose)
    }

    /// Record the aggregation of this frame into `local_map`.
    pub(crate) fn attach_to_local_map(&mut self, local_map: LocalMapId, world_to_local_map: &SE3) {
        let frame_to_local_map = world_to_local_map.compose(&self.robot_to_world);
        self.local_map = Some((local_map, frame_to_local_map));
    }

    /// Re-derive the world pose after the containing local map moved.
    pub(crate) fn follow_local_map(&mut self, local_map_to_world: &SE3) {
        if let Some((_, frame_to_local_map)) = self.local_map {
            self.set_robot_to_world(local_map_to_world.compose(&frame_to_local_map));
        }
    }

    pub fn points(&self) -> &[FramePoint] {
        &self.points
    }

    pub fn add_point(&mut self, point: FramePoint) {
        self.points.push(point);
    }

    /// Drop the point observations to save memory.
    pub fn release_points(&mut self) {
        self.points = Vec::new();
        self.points_released = true;
    }

    pub fn points_released(&self) -> bool {
        self.points_released
    }
}

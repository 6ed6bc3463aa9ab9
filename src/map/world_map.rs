//! WorldMap - Owner of all frames, local maps and landmarks of a session.
//!
//! The WorldMap is the central data structure of the mapping back end:
//! - Frames form a temporal chain fed by tracking
//! - Runs of frames are aggregated into LocalMaps, which form a chain of
//!   pose graph nodes (tracks)
//! - Landmarks move from the provisional window into the permanent set once a
//!   local map takes a snapshot of them
//!
//! It provides methods for:
//! - Creating frames and landmarks
//! - Deciding when to finalize a new local map (`create_local_map`)
//! - Registering loop closures between local maps
//! - Updating local map poses while keeping contained frames consistent

use std::collections::{BTreeMap, HashMap, HashSet};

use nalgebra::Vector3;
use serde::Deserialize;
use tracing::{debug, info};

use crate::geometry::SE3;

use super::error::MapError;
use super::frame::{Frame, FramePoint};
use super::landmark::{Landmark, LandmarkState};
use super::local_map::{Appearance, LocalMap, LocalMapConfig};
use super::types::{FrameId, LandmarkId, LocalMapId};

/// Below this many local maps, frame count alone triggers local map creation.
const BOOTSTRAP_LOCAL_MAP_COUNT: usize = 5;

/// Configuration for local map generation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldMapConfig {
    /// Translation (meters) accumulated since the last local map.
    pub minimum_distance_traveled_for_local_map: f64,

    /// Rotation (radians, angle-axis norm) accumulated since the last local map.
    pub minimum_rotation_for_local_map: f64,

    /// The frame queue must hold more frames than this.
    pub minimum_number_of_frames_for_local_map: usize,

    /// Release the point observations of aggregated frames.
    pub drop_framepoints: bool,
}

impl Default for WorldMapConfig {
    fn default() -> Self {
        Self {
            minimum_distance_traveled_for_local_map: 0.5,
            minimum_rotation_for_local_map: 0.5,
            minimum_number_of_frames_for_local_map: 4,
            drop_framepoints: false,
        }
    }
}

/// Outcome of the landmark window reset performed on local map creation.
///
/// Every landmark of the window before the reset appears in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowPartition {
    /// Attached to a local map, moved to the permanent set.
    pub promoted: Vec<LandmarkId>,

    /// Still tracked, kept in the window for the next local map.
    pub retained: Vec<LandmarkId>,

    /// Neither attached nor tracked, destroyed.
    pub discarded: Vec<LandmarkId>,
}

impl WindowPartition {
    pub fn len(&self) -> usize {
        self.promoted.len() + self.retained.len() + self.discarded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The map of one session.
pub struct WorldMap {
    config: WorldMapConfig,
    local_map_config: LocalMapConfig,

    /// All frames, ordered by identifier.
    frames: BTreeMap<FrameId, Frame>,
    root_frame: Option<FrameId>,
    current_frame: Option<FrameId>,
    previous_frame: Option<FrameId>,

    /// Local maps in creation order.
    local_maps: Vec<LocalMap>,
    local_map_index: HashMap<LocalMapId, usize>,
    current_local_map: Option<LocalMapId>,

    /// Provisional landmarks, pending attachment to a local map.
    landmarks_in_window: HashMap<LandmarkId, Landmark>,

    /// Landmarks contained in at least one local map.
    landmarks: HashMap<LandmarkId, Landmark>,

    /// Frames buffered since the last local map.
    frame_queue: Vec<FrameId>,
    distance_traveled_window: f64,
    rotation_window: f64,

    /// Current global pose estimate of the robot.
    robot_to_world: SE3,

    relocalized: bool,
    number_of_closures: usize,
    number_of_track_breaks: usize,
    last_window_partition: Option<WindowPartition>,

    next_frame_id: u64,
    next_local_map_id: u64,
    next_landmark_id: u64,
}

impl WorldMap {
    /// Create a new empty WorldMap with default parameters.
    pub fn new() -> Self {
        Self::with_config(WorldMapConfig::default(), LocalMapConfig::default())
    }

    pub fn with_config(config: WorldMapConfig, local_map_config: LocalMapConfig) -> Self {
        Self {
            config,
            local_map_config,
            frames: BTreeMap::new(),
            root_frame: None,
            current_frame: None,
            previous_frame: None,
            local_maps: Vec::new(),
            local_map_index: HashMap::new(),
            current_local_map: None,
            landmarks_in_window: HashMap::new(),
            landmarks: HashMap::new(),
            frame_queue: Vec::new(),
            distance_traveled_window: 0.0,
            rotation_window: 0.0,
            robot_to_world: SE3::identity(),
            relocalized: false,
            number_of_closures: 0,
            number_of_track_breaks: 0,
            last_window_partition: None,
            next_frame_id: 0,
            next_local_map_id: 0,
            next_landmark_id: 0,
        }
    }

    /// Drop all entities and start over with fresh identifier counters.
    pub fn clear(&mut self) {
        *self = Self::with_config(self.config.clone(), self.local_map_config.clone());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Frames
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new frame at the provided pose and append it to the chain.
    pub fn create_frame(&mut self, robot_to_world: SE3, maximum_depth_close: f64) -> FrameId {
        let id = FrameId::new(self.next_frame_id);
        self.next_frame_id += 1;

        self.previous_frame = self.current_frame;
        let frame = Frame::new(id, self.previous_frame, robot_to_world, maximum_depth_close);

        if let Some(previous) = self.previous_frame.and_then(|p| self.frames.get_mut(&p)) {
            previous.next = Some(id);
        }
        if self.root_frame.is_none() {
            self.root_frame = Some(id);
        }

        self.frames.insert(id, frame);
        self.current_frame = Some(id);
        self.frame_queue.push(id);
        self.robot_to_world = robot_to_world;
        id
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(&id)
    }

    /// All frames in identifier order.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn root_frame(&self) -> Option<FrameId> {
        self.root_frame
    }

    pub fn current_frame(&self) -> Option<FrameId> {
        self.current_frame
    }

    pub fn previous_frame(&self) -> Option<FrameId> {
        self.previous_frame
    }

    /// Frames buffered for the next local map.
    pub fn frame_queue(&self) -> &[FrameId] {
        &self.frame_queue
    }

    /// Attach a point observation to a frame.
    pub fn add_frame_point(&mut self, frame: FrameId, point: FramePoint) -> Result<(), MapError> {
        self.frames
            .get_mut(&frame)
            .ok_or(MapError::UnknownFrame(frame))?
            .add_point(point);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Landmarks
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a provisional landmark from an observation in `origin`.
    pub fn create_landmark(
        &mut self,
        origin: FrameId,
        coordinates: Vector3<f64>,
    ) -> Result<LandmarkId, MapError> {
        if !self.frames.contains_key(&origin) {
            return Err(MapError::UnknownFrame(origin));
        }

        let id = LandmarkId::new(self.next_landmark_id);
        self.next_landmark_id += 1;
        self.landmarks_in_window
            .insert(id, Landmark::new(id, origin, coordinates));
        Ok(id)
    }

    /// Get a landmark from either the window or the permanent set.
    pub fn landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks
            .get(&id)
            .or_else(|| self.landmarks_in_window.get(&id))
    }

    pub fn landmark_mut(&mut self, id: LandmarkId) -> Option<&mut Landmark> {
        match self.landmarks.get_mut(&id) {
            Some(landmark) => Some(landmark),
            None => self.landmarks_in_window.get_mut(&id),
        }
    }

    pub fn set_landmark_tracked(&mut self, id: LandmarkId, tracked: bool) -> Result<(), MapError> {
        self.landmark_mut(id)
            .ok_or(MapError::UnknownLandmark(id))?
            .set_is_currently_tracked(tracked);
        Ok(())
    }

    pub fn set_landmark_coordinates(
        &mut self,
        id: LandmarkId,
        coordinates: Vector3<f64>,
    ) -> Result<(), MapError> {
        self.landmark_mut(id)
            .ok_or(MapError::UnknownLandmark(id))?
            .reset_coordinates(coordinates);
        Ok(())
    }

    /// Permanent landmarks.
    pub fn landmarks(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.values()
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    /// Provisional landmarks.
    pub fn landmarks_in_window(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks_in_window.values()
    }

    pub fn num_landmarks_in_window(&self) -> usize {
        self.landmarks_in_window.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Maps
    // ─────────────────────────────────────────────────────────────────────────

    /// Attempt to create a new local map from the buffered frames.
    ///
    /// Returns true if a local map was generated.
    pub fn create_local_map(&mut self) -> bool {
        let (Some(previous_id), Some(current_id)) = (self.previous_frame, self.current_frame) else {
            return false;
        };
        if self.frame_queue.is_empty() {
            return false;
        }

        self.relocalized = false;

        let (Some(previous), Some(current)) =
            (self.frames.get(&previous_id), self.frames.get(&current_id))
        else {
            return false;
        };
        let motion = previous.world_to_robot().compose(current.robot_to_world());
        self.distance_traveled_window += motion.translation.norm();
        self.rotation_window += motion.rotation_angle();

        // If generated by translation only a minimum number of frames is required
        let queued = self.frame_queue.len();
        let enough_frames = queued > self.config.minimum_number_of_frames_for_local_map;
        let by_rotation = self.rotation_window > self.config.minimum_rotation_for_local_map;
        let by_translation = enough_frames
            && self.distance_traveled_window > self.config.minimum_distance_traveled_for_local_map;
        let bootstrapping = enough_frames && self.local_maps.len() < BOOTSTRAP_LOCAL_MAP_COUNT;

        if !(by_rotation || by_translation || bootstrapping) {
            return false;
        }

        debug!(
            "Local map trigger: frames={}, distance={:.3}, rotation={:.3} (rotation={}, translation={}, bootstrap={})",
            queued,
            self.distance_traveled_window,
            self.rotation_window,
            by_rotation,
            by_translation,
            bootstrapping
        );

        self.finalize_local_map();
        true
    }

    /// Build a local map from the frame queue and link it into the chain.
    fn finalize_local_map(&mut self) {
        let id = LocalMapId::new(self.next_local_map_id);
        self.next_local_map_id += 1;

        let frames = std::mem::take(&mut self.frame_queue);
        let keyframe_id = frames[frames.len() - 1];
        let local_map_to_world = *self.frames[&keyframe_id].robot_to_world();
        let world_to_local_map = local_map_to_world.inverse();

        // Snapshot every landmark observed in the run. Provisional ones get
        // attached here, permanent ones are shared with earlier local maps.
        let mut landmarks = Vec::new();
        let mut appearances = Vec::new();
        let mut contained: HashSet<LandmarkId> = HashSet::new();
        for frame_id in &frames {
            for point in self.frames[frame_id].points() {
                let Some(landmark_id) = point.landmark else {
                    continue;
                };

                if !contained.contains(&landmark_id) {
                    let coordinates = match self.landmarks_in_window.get_mut(&landmark_id) {
                        Some(landmark) => {
                            landmark.set_local_map(id);
                            Some(*landmark.coordinates())
                        }
                        None => self.landmarks.get(&landmark_id).map(|l| *l.coordinates()),
                    };
                    let Some(coordinates) = coordinates else {
                        continue;
                    };
                    landmarks.push(LandmarkState {
                        landmark: landmark_id,
                        coordinates_in_local_map: world_to_local_map.transform_point(&coordinates),
                    });
                    contained.insert(landmark_id);
                }

                if let Some(descriptor) = &point.descriptor {
                    appearances.push(Appearance {
                        landmark: landmark_id,
                        descriptor: descriptor.clone(),
                    });
                }
            }
        }

        if landmarks.len() < self.local_map_config.minimum_number_of_landmarks {
            debug!(
                "Local map {} holds {} landmarks (target {})",
                id,
                landmarks.len(),
                self.local_map_config.minimum_number_of_landmarks
            );
        }

        for frame_id in &frames {
            if let Some(frame) = self.frames.get_mut(frame_id) {
                frame.attach_to_local_map(id, &world_to_local_map);
            }
        }
        if let Some(keyframe) = self.frames.get_mut(&keyframe_id) {
            keyframe.set_anchor(id);
        }

        // Link into the chain
        let previous = self.current_local_map;
        let root = previous.and_then(|p| self.local_map(p)).map(|p| p.root());
        if let Some(previous_local_map) = previous.and_then(|p| self.local_map_mut(p)) {
            previous_local_map.set_next(id);
        }

        let local_map = LocalMap::new(
            id,
            keyframe_id,
            local_map_to_world,
            root,
            previous,
            frames,
            landmarks,
            appearances,
        );
        self.local_map_index.insert(id, self.local_maps.len());
        self.local_maps.push(local_map);
        self.current_local_map = Some(id);
        self.current_frame = Some(keyframe_id);

        let partition = self.reset_window_for_local_map_creation();
        debug!(
            "Created local map {} at keyframe {}: promoted={}, retained={}, discarded={}",
            id,
            keyframe_id,
            partition.promoted.len(),
            partition.retained.len(),
            partition.discarded.len()
        );
        self.last_window_partition = Some(partition);
    }

    /// Reset the generation properties and sort out the landmark window.
    fn reset_window_for_local_map_creation(&mut self) -> WindowPartition {
        self.distance_traveled_window = 0.0;
        self.rotation_window = 0.0;

        // The last frame is needed for the next tracking step
        if self.config.drop_framepoints {
            if let Some((_, released)) = self.local_maps.last().and_then(|lm| lm.frames().split_last()) {
                for frame_id in released {
                    if let Some(frame) = self.frames.get_mut(frame_id) {
                        frame.release_points();
                    }
                }
            }
        }

        let mut partition = WindowPartition::default();
        let mut retained = HashMap::new();
        for (id, landmark) in self.landmarks_in_window.drain() {
            if landmark.local_map().is_some() {
                self.landmarks.insert(id, landmark);
                partition.promoted.push(id);
            } else if landmark.is_currently_tracked() {
                retained.insert(id, landmark);
                partition.retained.push(id);
            } else {
                partition.discarded.push(id);
            }
        }
        self.landmarks_in_window = retained;
        partition
    }

    /// Window partition of the most recent local map creation.
    pub fn last_window_partition(&self) -> Option<&WindowPartition> {
        self.last_window_partition.as_ref()
    }

    /// Handle a tracking loss.
    ///
    /// The next local map still continues the current chain, but its
    /// identifier is not adjacent to the current one, so no sequential
    /// constraint links the two. Assembly restarts with the next two frames.
    ///
    /// The frame chain is split as well: the last frame before the break keeps
    /// `next = None` and the first frame after it starts with `previous = None`.
    pub fn break_track(&mut self) {
        self.frame_queue.clear();
        self.distance_traveled_window = 0.0;
        self.rotation_window = 0.0;
        self.previous_frame = None;
        self.current_frame = None;
        if self.current_local_map.is_some() {
            self.next_local_map_id += 1;
        }
        self.number_of_track_breaks += 1;
        info!(
            "Track broken ({} so far), next local map id LM{}",
            self.number_of_track_breaks, self.next_local_map_id
        );
    }

    pub fn local_map(&self, id: LocalMapId) -> Option<&LocalMap> {
        self.local_map_index.get(&id).map(|&index| &self.local_maps[index])
    }

    fn local_map_mut(&mut self, id: LocalMapId) -> Option<&mut LocalMap> {
        let index = *self.local_map_index.get(&id)?;
        self.local_maps.get_mut(index)
    }

    /// All local maps in creation order.
    pub fn local_maps(&self) -> &[LocalMap] {
        &self.local_maps
    }

    pub fn num_local_maps(&self) -> usize {
        self.local_maps.len()
    }

    pub fn current_local_map(&self) -> Option<&LocalMap> {
        self.current_local_map.and_then(|id| self.local_map(id))
    }

    /// Move a local map, carrying its contained frames along.
    pub fn update_local_map(&mut self, id: LocalMapId, local_map_to_world: SE3) -> Result<(), MapError> {
        let index = *self
            .local_map_index
            .get(&id)
            .ok_or(MapError::UnknownLocalMap(id))?;

        let local_map = &mut self.local_maps[index];
        local_map.update(local_map_to_world);
        for frame_id in local_map.frames() {
            if let Some(frame) = self.frames.get_mut(frame_id) {
                frame.follow_local_map(&local_map_to_world);
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loop Closures
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a loop closure constraint between two local maps.
    ///
    /// `query_to_reference` maps coordinates of the query local map into the
    /// reference local map; `omega` is its scalar information value.
    pub fn add_loop_closure(
        &mut self,
        query: LocalMapId,
        reference: LocalMapId,
        query_to_reference: SE3,
        omega: f64,
    ) -> Result<(), MapError> {
        if !self.local_map_index.contains_key(&reference) {
            return Err(MapError::UnknownLocalMap(reference));
        }
        self.local_map_mut(query)
            .ok_or(MapError::UnknownLocalMap(query))?
            .add_closure(reference, query_to_reference, omega);

        self.relocalized = true;
        self.number_of_closures += 1;
        info!(
            "Loop closure {} -> {} (omega {:.3}, {} total)",
            query, reference, omega, self.number_of_closures
        );
        Ok(())
    }

    /// Whether a closure was registered since the last local map attempt.
    pub fn relocalized(&self) -> bool {
        self.relocalized
    }

    pub fn number_of_closures(&self) -> usize {
        self.number_of_closures
    }

    pub fn number_of_track_breaks(&self) -> usize {
        self.number_of_track_breaks
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Robot Pose
    // ─────────────────────────────────────────────────────────────────────────

    pub fn robot_to_world(&self) -> &SE3 {
        &self.robot_to_world
    }

    pub fn set_robot_to_world(&mut self, robot_to_world: SE3) {
        self.robot_to_world = robot_to_world;
    }
}

impl Default for WorldMap {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorldMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldMap")
            .field("num_frames", &self.frames.len())
            .field("num_local_maps", &self.local_maps.len())
            .field("num_landmarks", &self.landmarks.len())
            .field("num_landmarks_in_window", &self.landmarks_in_window.len())
            .field("number_of_closures", &self.number_of_closures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, UnitQuaternion};

    fn translation(x: f64) -> SE3 {
        SE3::from_translation(Vector3::new(x, 0.0, 0.0))
    }

    /// Create frames along the x axis, running local map creation after each.
    fn drive(map: &mut WorldMap, positions: &[f64]) -> Vec<(FrameId, bool)> {
        positions
            .iter()
            .map(|&x| {
                let id = map.create_frame(translation(x), 5.0);
                (id, map.create_local_map())
            })
            .collect()
    }

    #[test]
    fn test_create_frame_links_chain() {
        let mut map = WorldMap::new();
        let f0 = map.create_frame(translation(0.0), 5.0);
        let f1 = map.create_frame(translation(0.1), 5.0);

        assert_eq!(map.root_frame(), Some(f0));
        assert_eq!(map.current_frame(), Some(f1));
        assert_eq!(map.previous_frame(), Some(f0));
        assert_eq!(map.frame(f0).unwrap().next, Some(f1));
        assert_eq!(map.frame(f1).unwrap().previous, Some(f0));
        assert_eq!(map.frame_queue(), &[f0, f1]);
    }

    #[test]
    fn test_no_local_map_before_second_frame() {
        let mut map = WorldMap::new();
        assert!(!map.create_local_map());

        map.create_frame(SE3::identity(), 5.0);
        assert!(!map.create_local_map());
        assert_eq!(map.num_local_maps(), 0);
    }

    #[test]
    fn test_bootstrap_scenario_creates_single_local_map() {
        let mut map = WorldMap::new();
        let results = drive(&mut map, &[0.0, 0.05, 0.1, 0.15, 0.2, 0.25]);

        let created: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, (_, created))| *created)
            .map(|(index, _)| index)
            .collect();
        assert_eq!(created, vec![4]);

        let frame_ids: Vec<FrameId> = results.iter().map(|(id, _)| *id).collect();
        let local_map = map.current_local_map().unwrap();
        assert_eq!(local_map.frames(), &frame_ids[0..5]);
        assert_eq!(local_map.keyframe(), frame_ids[4]);
        assert!(map.frame(frame_ids[4]).unwrap().is_keyframe());
        assert_eq!(map.frame_queue(), &[frame_ids[5]]);
    }

    #[test]
    fn test_rotation_triggers_local_map() {
        let mut map = WorldMap::new();
        map.create_frame(SE3::identity(), 5.0);
        assert!(!map.create_local_map());

        let turned = SE3::new(UnitQuaternion::from_euler_angles(0.0, 0.0, 0.6), Vector3::zeros());
        map.create_frame(turned, 5.0);
        assert!(map.create_local_map());
        assert_eq!(map.num_local_maps(), 1);
    }

    #[test]
    fn test_translation_needs_enough_frames_after_bootstrap() {
        let config = WorldMapConfig {
            minimum_number_of_frames_for_local_map: 2,
            ..WorldMapConfig::default()
        };
        let mut map = WorldMap::with_config(config, LocalMapConfig::default());

        // Bootstrap five local maps of three frames each
        let mut x = 0.0;
        while map.num_local_maps() < BOOTSTRAP_LOCAL_MAP_COUNT {
            map.create_frame(translation(x), 5.0);
            map.create_local_map();
            x += 0.01;
        }

        // A large step with a short queue does not trigger
        map.create_frame(translation(x + 1.0), 5.0);
        assert!(!map.create_local_map());
        map.create_frame(translation(x + 1.01), 5.0);
        assert!(!map.create_local_map());

        // Third queued frame satisfies the frame count
        map.create_frame(translation(x + 1.02), 5.0);
        assert!(map.create_local_map());
    }

    #[test]
    fn test_local_maps_are_chained() {
        let mut map = WorldMap::new();
        drive(&mut map, &[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        assert_eq!(map.num_local_maps(), 2);

        let first = &map.local_maps()[0];
        let second = &map.local_maps()[1];
        assert_eq!(first.next(), Some(second.id));
        assert_eq!(second.previous(), Some(first.id));
        assert_eq!(second.root(), first.id);
        assert!(second.id.is_successor_of(first.id));
    }

    #[test]
    fn test_local_map_snapshots_landmarks_once() {
        let mut map = WorldMap::new();
        let f0 = map.create_frame(translation(0.0), 5.0);
        let landmark = map.create_landmark(f0, Vector3::new(2.0, 1.0, 0.0)).unwrap();
        map.add_frame_point(
            f0,
            FramePoint::new(Vector3::new(2.0, 1.0, 0.0))
                .with_landmark(landmark)
                .with_descriptor(vec![0xAB; 32]),
        )
        .unwrap();

        for i in 1..5 {
            let f = map.create_frame(translation(i as f64 * 0.1), 5.0);
            map.add_frame_point(f, FramePoint::new(Vector3::zeros()).with_landmark(landmark))
                .unwrap();
            map.create_local_map();
        }

        let local_map = map.current_local_map().unwrap();
        assert_eq!(local_map.landmarks().len(), 1);
        assert_eq!(local_map.appearances().len(), 1);

        // Local map is posed at the keyframe (x = 0.4)
        let state = local_map.landmarks()[0];
        assert_eq!(state.landmark, landmark);
        assert_relative_eq!(state.coordinates_in_local_map, Vector3::new(1.6, 1.0, 0.0), epsilon = 1e-12);
        assert_eq!(map.landmark(landmark).unwrap().local_map(), Some(local_map.id));
    }

    #[test]
    fn test_window_partition_accounts_for_every_landmark() {
        let mut map = WorldMap::new();
        let f0 = map.create_frame(translation(0.0), 5.0);

        let observed = map.create_landmark(f0, Vector3::new(1.0, 0.0, 0.0)).unwrap();
        let observed_lost = map.create_landmark(f0, Vector3::new(2.0, 0.0, 0.0)).unwrap();
        let tracked = map.create_landmark(f0, Vector3::new(3.0, 0.0, 0.0)).unwrap();
        let lost = map.create_landmark(f0, Vector3::new(4.0, 0.0, 0.0)).unwrap();

        map.add_frame_point(f0, FramePoint::new(Vector3::zeros()).with_landmark(observed))
            .unwrap();
        map.add_frame_point(f0, FramePoint::new(Vector3::zeros()).with_landmark(observed_lost))
            .unwrap();
        map.set_landmark_tracked(observed_lost, false).unwrap();
        map.set_landmark_tracked(lost, false).unwrap();

        let before: HashSet<LandmarkId> = map.landmarks_in_window().map(|l| l.id).collect();
        drive(&mut map, &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(map.num_local_maps(), 1);

        let partition = map.last_window_partition().unwrap().clone();
        assert_eq!(partition.len(), before.len());

        let mut promoted = partition.promoted.clone();
        promoted.sort();
        assert_eq!(promoted, vec![observed, observed_lost]);
        assert_eq!(partition.retained, vec![tracked]);
        assert_eq!(partition.discarded, vec![lost]);

        let accounted: HashSet<LandmarkId> = partition
            .promoted
            .iter()
            .chain(&partition.retained)
            .chain(&partition.discarded)
            .copied()
            .collect();
        assert_eq!(accounted, before);

        assert_eq!(map.num_landmarks(), 2);
        assert_eq!(map.num_landmarks_in_window(), 1);
        assert!(map.landmark(tracked).unwrap().local_map().is_none());
        assert!(map.landmark(lost).is_none());
    }

    #[test]
    fn test_tracked_landmark_survives_until_attached() {
        let mut map = WorldMap::new();
        let f0 = map.create_frame(translation(0.0), 5.0);
        let landmark = map.create_landmark(f0, Vector3::new(1.0, 2.0, 3.0)).unwrap();

        drive(&mut map, &[0.1, 0.2, 0.3, 0.4]);
        assert_eq!(map.num_local_maps(), 1);
        assert!(map.landmarks_in_window().any(|l| l.id == landmark));

        // Observed during the next run: attached and promoted there
        let mut attached = false;
        for x in [0.5, 0.6, 0.7, 0.8, 0.9] {
            let f = map.create_frame(translation(x), 5.0);
            map.add_frame_point(f, FramePoint::new(Vector3::zeros()).with_landmark(landmark))
                .unwrap();
            attached |= map.create_local_map();
        }
        assert!(attached);
        assert_eq!(map.landmark(landmark).unwrap().local_map(), Some(map.local_maps()[1].id));
        assert_eq!(map.num_landmarks_in_window(), 0);
    }

    #[test]
    fn test_permanent_landmark_shared_by_later_local_map() {
        let mut map = WorldMap::new();
        let f0 = map.create_frame(translation(0.0), 5.0);
        let landmark = map.create_landmark(f0, Vector3::new(3.0, 0.0, 0.0)).unwrap();

        map.add_frame_point(f0, FramePoint::new(Vector3::zeros()).with_landmark(landmark))
            .unwrap();
        for x in [0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9] {
            let f = map.create_frame(translation(x), 5.0);
            map.add_frame_point(f, FramePoint::new(Vector3::zeros()).with_landmark(landmark))
                .unwrap();
            map.create_local_map();
        }
        assert_eq!(map.num_local_maps(), 2);

        let first = &map.local_maps()[0];
        let second = &map.local_maps()[1];
        assert_eq!(first.landmarks().len(), 1);
        assert_eq!(second.landmarks().len(), 1);
        assert_eq!(second.landmarks()[0].landmark, landmark);

        // Keyframes at x = 0.4 and x = 0.9
        assert_relative_eq!(first.landmarks()[0].coordinates_in_local_map.x, 2.6, epsilon = 1e-12);
        assert_relative_eq!(second.landmarks()[0].coordinates_in_local_map.x, 2.1, epsilon = 1e-12);

        // Ownership stays with the local map that promoted it
        assert_eq!(map.landmark(landmark).unwrap().local_map(), Some(first.id));
        assert_eq!(map.num_landmarks(), 1);
    }

    #[test]
    fn test_drop_framepoints_keeps_last_frame() {
        let config = WorldMapConfig {
            drop_framepoints: true,
            ..WorldMapConfig::default()
        };
        let mut map = WorldMap::with_config(config, LocalMapConfig::default());

        let mut ids = Vec::new();
        for i in 0..5 {
            let f = map.create_frame(translation(i as f64 * 0.1), 5.0);
            map.add_frame_point(f, FramePoint::new(Vector3::new(0.0, 0.0, 1.0))).unwrap();
            map.create_local_map();
            ids.push(f);
        }
        assert_eq!(map.num_local_maps(), 1);

        for id in &ids[..4] {
            assert!(map.frame(*id).unwrap().points_released());
        }
        let last = map.frame(ids[4]).unwrap();
        assert!(!last.points_released());
        assert_eq!(last.points().len(), 1);
    }

    #[test]
    fn test_update_local_map_moves_frames() {
        let mut map = WorldMap::new();
        let results = drive(&mut map, &[0.0, 0.1, 0.2, 0.3, 0.4]);
        let id = map.current_local_map().unwrap().id;

        map.update_local_map(id, translation(1.4)).unwrap();

        let local_map = map.local_map(id).unwrap();
        let product = local_map.local_map_to_world().compose(local_map.world_to_local_map());
        assert_relative_eq!(product.to_matrix(), Matrix4::identity(), epsilon = 1e-12);

        // Every frame shifted by one meter
        for (i, (frame_id, _)) in results.iter().enumerate() {
            let x = map.frame(*frame_id).unwrap().robot_to_world().translation.x;
            assert_relative_eq!(x, 1.0 + i as f64 * 0.1, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_add_loop_closure() {
        let mut map = WorldMap::new();
        drive(&mut map, &[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9]);
        let first = map.local_maps()[0].id;
        let second = map.local_maps()[1].id;

        map.add_loop_closure(second, first, translation(-0.5), 0.8).unwrap();

        assert!(map.relocalized());
        assert_eq!(map.number_of_closures(), 1);
        let closure = &map.local_map(second).unwrap().closures()[0];
        assert_eq!(closure.local_map, first);
        assert_eq!(closure.omega, 0.8);

        // Next local map attempt clears the relocalization status
        map.create_frame(translation(1.0), 5.0);
        map.create_local_map();
        assert!(!map.relocalized());
    }

    #[test]
    fn test_add_loop_closure_unknown_local_map() {
        let mut map = WorldMap::new();
        drive(&mut map, &[0.0, 0.1, 0.2, 0.3, 0.4]);
        let known = map.local_maps()[0].id;
        let unknown = LocalMapId::new(42);

        assert_eq!(
            map.add_loop_closure(known, unknown, SE3::identity(), 1.0),
            Err(MapError::UnknownLocalMap(unknown))
        );
        assert_eq!(
            map.add_loop_closure(unknown, known, SE3::identity(), 1.0),
            Err(MapError::UnknownLocalMap(unknown))
        );
        assert_eq!(map.number_of_closures(), 0);
        assert!(!map.relocalized());
    }

    #[test]
    fn test_break_track_skips_identifier() {
        let mut map = WorldMap::new();
        let frames = drive(&mut map, &[0.0, 0.1, 0.2, 0.3, 0.4]);
        let before = map.current_local_map().unwrap().id;

        map.break_track();
        assert_eq!(map.number_of_track_breaks(), 1);
        assert!(map.frame_queue().is_empty());

        // First frame after the break cannot trigger anything
        let resumed = map.create_frame(translation(5.0), 5.0);
        assert!(!map.create_local_map());
        assert_eq!(map.frame(resumed).unwrap().previous, None);
        assert_eq!(map.frame(frames[4].0).unwrap().next, None);
        drive(&mut map, &[5.1, 5.2, 5.3, 5.4]);

        let after = map.current_local_map().unwrap();
        assert_eq!(after.previous(), Some(before));
        assert_eq!(after.root(), before);
        assert!(!after.id.is_successor_of(before));
        assert_eq!(after.id, LocalMapId::new(before.0 + 2));
    }

    #[test]
    fn test_create_landmark_unknown_frame() {
        let mut map = WorldMap::new();
        assert_eq!(
            map.create_landmark(FrameId::new(3), Vector3::zeros()),
            Err(MapError::UnknownFrame(FrameId::new(3)))
        );
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut map = WorldMap::new();
        drive(&mut map, &[0.0, 0.1, 0.2, 0.3, 0.4]);
        map.clear();

        assert_eq!(map.num_frames(), 0);
        assert_eq!(map.num_local_maps(), 0);
        assert!(map.current_local_map().is_none());
        assert_eq!(map.create_frame(SE3::identity(), 5.0), FrameId::new(0));
    }
}

//! GraphOptimizer - Pose graph solve followed by landmark resolution.

use serde::Deserialize;
use tracing::info;

use crate::map::{MapError, WorldMap};

use super::landmarks::resolve_landmarks;
use super::pose_graph::{apply_pose_graph_result, collect_pose_graph, solve_pose_graph, PoseGraphResult};

/// Configuration for pose graph optimization.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphOptimizerConfig {
    /// Maximum number of LM iterations.
    pub max_iterations: usize,

    /// Multiplier applied to a closure's omega to get its information weight.
    pub closure_information_scale: f64,

    /// Stop once the update step norm falls below this.
    pub step_tolerance: f64,
}

impl Default for GraphOptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            closure_information_scale: 10.0,
            step_tolerance: 1e-9,
        }
    }
}

/// Summary of one `optimize` call.
#[derive(Debug, Clone)]
pub struct OptimizationSummary {
    pub pose_graph: PoseGraphResult,
    pub updated_local_maps: usize,
    pub updated_landmarks: usize,
}

/// Runs full batch optimizations on a WorldMap.
#[derive(Debug, Default)]
pub struct GraphOptimizer {
    config: GraphOptimizerConfig,
    number_of_optimizations: usize,
}

impl GraphOptimizer {
    pub fn new(config: GraphOptimizerConfig) -> Self {
        Self {
            config,
            number_of_optimizations: 0,
        }
    }

    pub fn number_of_optimizations(&self) -> usize {
        self.number_of_optimizations
    }

    /// Optimize local map poses, then recompute landmark coordinates.
    ///
    /// Returns None if the map has no local maps.
    pub fn optimize(&mut self, map: &mut WorldMap) -> Result<Option<OptimizationSummary>, MapError> {
        let Some(problem) = collect_pose_graph(map, &self.config) else {
            return Ok(None);
        };

        let result = solve_pose_graph(&problem, &self.config);
        let updated_local_maps = apply_pose_graph_result(map, &result)?;
        let updated_landmarks = resolve_landmarks(map);
        self.number_of_optimizations += 1;

        info!(
            "Optimization #{}: {} local maps, {} edges, {} iterations, error {:.6} -> {:.6}, {} landmarks",
            self.number_of_optimizations,
            updated_local_maps,
            problem.edges.len(),
            result.iterations,
            result.initial_error,
            result.final_error,
            updated_landmarks
        );

        Ok(Some(OptimizationSummary {
            pose_graph: result,
            updated_local_maps,
            updated_landmarks,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use crate::geometry::SE3;
    use crate::map::FramePoint;

    fn translation(x: f64) -> SE3 {
        SE3::from_translation(Vector3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_config_default() {
        let config = GraphOptimizerConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.closure_information_scale, 10.0);
    }

    #[test]
    fn test_optimize_empty_map() {
        let mut optimizer = GraphOptimizer::default();
        let mut map = WorldMap::new();

        assert!(optimizer.optimize(&mut map).unwrap().is_none());
        assert_eq!(optimizer.number_of_optimizations(), 0);
    }

    #[test]
    fn test_optimize_moves_landmarks_with_local_maps() {
        let mut map = WorldMap::new();
        let mut landmark = None;
        let mut frame = 0;
        while map.num_local_maps() < 3 {
            let id = map.create_frame(translation(frame as f64 * 0.2), 5.0);
            if frame == 12 {
                let l = map.create_landmark(id, Vector3::new(3.0, 1.0, 0.0)).unwrap();
                map.add_frame_point(id, FramePoint::new(Vector3::new(0.6, 1.0, 0.0)).with_landmark(l))
                    .unwrap();
                landmark = Some(l);
            }
            map.create_local_map();
            frame += 1;
        }
        let landmark = landmark.unwrap();

        // Odometry says 2 m between first and last, the closure 1.5 m
        let first = map.local_maps()[0].id;
        let last = map.local_maps()[2].id;
        map.add_loop_closure(last, first, translation(1.5), 1.0).unwrap();

        let mut optimizer = GraphOptimizer::default();
        let summary = optimizer.optimize(&mut map).unwrap().unwrap();

        assert_eq!(optimizer.number_of_optimizations(), 1);
        assert_eq!(summary.updated_local_maps, 3);
        assert_eq!(summary.updated_landmarks, 1);

        // The landmark keeps its offset to the moved local map
        let last_pose = *map.local_maps()[2].local_map_to_world();
        assert!(last_pose.translation.x < 2.8);
        assert_relative_eq!(
            map.landmark(landmark).unwrap().coordinates().x,
            last_pose.translation.x + 0.2,
            epsilon = 1e-9
        );
    }
}

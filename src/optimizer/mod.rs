//! Optimization module for the local map pose graph.
//!
//! Implements Levenberg-Marquardt optimization for:
//! - Pose graph over local maps (sequential + loop closure edges)
//! - Landmark re-projection from local map snapshots

pub mod graph_optimizer;
pub mod landmarks;
pub mod pose_graph;

pub use graph_optimizer::{GraphOptimizer, GraphOptimizerConfig, OptimizationSummary};
pub use landmarks::resolve_landmarks;
pub use pose_graph::{
    apply_pose_graph_result, collect_pose_graph, solve_pose_graph, EdgeType, PoseGraphEdge,
    PoseGraphProblem, PoseGraphResult, PoseGraphVertex,
};

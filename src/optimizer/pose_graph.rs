//! Pose Graph Optimization over the local map chain.
//!
//! Vertices are local map poses (`local_map_to_world`), edges are sequential
//! odometry constraints between adjacent local maps of a track and loop
//! closure constraints. The graph is rebuilt from scratch on every call.
//!
//! This module uses the three-phase pattern:
//! 1. COLLECT: Extract vertices and edges from the WorldMap
//! 2. SOLVE: Run LM optimization on a detached problem
//! 3. APPLY: Write back optimized poses

use std::collections::{BTreeMap, HashMap};

use nalgebra::{DMatrix, DVector, Matrix6, Vector6};
use tracing::{debug, warn};

use crate::geometry::SE3;
use crate::map::{LocalMapId, MapError, WorldMap};

use super::graph_optimizer::GraphOptimizerConfig;

/// Step used for the central-difference Jacobians.
const JACOBIAN_EPSILON: f64 = 1e-6;

/// Type of pose graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeType {
    /// Between adjacent local maps of a track.
    Sequential,
    /// From a closure reference to its query.
    Closure,
}

/// A pose vertex.
#[derive(Debug, Clone)]
pub struct PoseGraphVertex {
    pub local_map: LocalMapId,

    /// Initial `local_map_to_world` estimate.
    pub pose: SE3,

    /// Fixed vertices are held constant by the solve.
    pub fixed: bool,
}

/// A relative pose constraint between two vertices.
#[derive(Debug, Clone)]
pub struct PoseGraphEdge {
    pub local_map_i: LocalMapId,
    pub local_map_j: LocalMapId,

    /// Measured `T_i⁻¹ ∘ T_j`.
    pub measurement: SE3,

    /// Isotropic information weight.
    pub information: f64,

    pub edge_type: EdgeType,
}

/// Data extracted for pose graph optimization.
#[derive(Debug, Clone, Default)]
pub struct PoseGraphProblem {
    /// Vertices in track order.
    pub vertices: Vec<PoseGraphVertex>,

    pub edges: Vec<PoseGraphEdge>,

    /// Closures skipped because an endpoint is not a vertex.
    pub inert_closures: usize,
}

impl PoseGraphProblem {
    pub fn num_edges_of_type(&self, edge_type: EdgeType) -> usize {
        self.edges.iter().filter(|e| e.edge_type == edge_type).count()
    }

    pub fn vertex(&self, local_map: LocalMapId) -> Option<&PoseGraphVertex> {
        self.vertices.iter().find(|v| v.local_map == local_map)
    }
}

/// Result of pose graph optimization.
#[derive(Debug, Clone)]
pub struct PoseGraphResult {
    /// Optimized poses of every vertex, fixed ones included.
    pub optimized_poses: Vec<(LocalMapId, SE3)>,

    /// Number of iterations.
    pub iterations: usize,

    /// Initial weighted error.
    pub initial_error: f64,

    /// Final weighted error.
    pub final_error: f64,
}

/// PHASE 1: Collect pose graph data from the map.
///
/// Returns None if the map has no local map yet.
pub fn collect_pose_graph(map: &WorldMap, config: &GraphOptimizerConfig) -> Option<PoseGraphProblem> {
    let root = map.current_local_map()?.root();

    let mut problem = PoseGraphProblem::default();
    let mut index: HashMap<LocalMapId, usize> = HashMap::new();

    // Walk the track from its root
    let mut previous: Option<(LocalMapId, SE3)> = None;
    let mut cursor = Some(root);
    while let Some(id) = cursor {
        if index.contains_key(&id) {
            break;
        }
        let Some(local_map) = map.local_map(id) else {
            break;
        };
        let pose = *local_map.local_map_to_world();

        index.insert(id, problem.vertices.len());
        problem.vertices.push(PoseGraphVertex {
            local_map: id,
            pose,
            fixed: id == root,
        });

        if let Some((previous_id, previous_pose)) = previous {
            if id.is_successor_of(previous_id) {
                problem.edges.push(PoseGraphEdge {
                    local_map_i: previous_id,
                    local_map_j: id,
                    measurement: previous_pose.inverse().compose(&pose),
                    information: 1.0,
                    edge_type: EdgeType::Sequential,
                });
            }
        }

        previous = Some((id, pose));
        cursor = local_map.next();
    }

    // Closures of every local map, not only the walked ones
    for local_map in map.local_maps() {
        for closure in local_map.closures() {
            let query = local_map.id;
            let reference = closure.local_map;
            let (Some(&reference_index), true) = (index.get(&reference), index.contains_key(&query))
            else {
                warn!(
                    "Closure {} -> {} references a local map outside the current track, skipped",
                    query, reference
                );
                problem.inert_closures += 1;
                continue;
            };

            problem.vertices[reference_index].fixed = true;
            problem.edges.push(PoseGraphEdge {
                local_map_i: reference,
                local_map_j: query,
                measurement: closure.relation,
                information: closure.omega * config.closure_information_scale,
                edge_type: EdgeType::Closure,
            });
        }
    }

    debug!(
        "Collected pose graph: {} vertices, {} sequential edges, {} closure edges, {} inert closures",
        problem.vertices.len(),
        problem.num_edges_of_type(EdgeType::Sequential),
        problem.num_edges_of_type(EdgeType::Closure),
        problem.inert_closures
    );

    Some(problem)
}

/// PHASE 2: Solve pose graph optimization.
///
/// Levenberg-Marquardt with right-hand perturbations `T ← T ∘ exp(δ)`.
pub fn solve_pose_graph(problem: &PoseGraphProblem, config: &GraphOptimizerConfig) -> PoseGraphResult {
    let vertex_index: HashMap<LocalMapId, usize> = problem
        .vertices
        .iter()
        .enumerate()
        .map(|(i, v)| (v.local_map, i))
        .collect();

    // Map from vertex index to parameter block (skipping fixed)
    let mut block_of: HashMap<usize, usize> = HashMap::new();
    for (i, vertex) in problem.vertices.iter().enumerate() {
        if !vertex.fixed {
            block_of.insert(i, block_of.len());
        }
    }

    // Edges as vertex index pairs
    let edges: Vec<(usize, usize, &PoseGraphEdge)> = problem
        .edges
        .iter()
        .filter_map(|e| Some((*vertex_index.get(&e.local_map_i)?, *vertex_index.get(&e.local_map_j)?, e)))
        .collect();

    let mut poses: Vec<SE3> = problem.vertices.iter().map(|v| v.pose).collect();
    let initial_error = compute_pose_graph_error(&poses, &edges);

    let n_params = block_of.len() * 6;
    let mut iterations = 0;

    if n_params > 0 && !edges.is_empty() {
        let mut lambda = 1e-3;
        let lambda_up = 10.0;
        let lambda_down = 0.1;
        let min_lambda = 1e-10;
        let max_lambda = 1e10;
        let mut current_error = initial_error;

        for iter in 0..config.max_iterations {
            iterations = iter + 1;

            let (hessian, gradient) = build_normal_equations(&poses, &edges, &block_of, n_params);

            // Damped system
            let mut damped = hessian;
            for i in 0..n_params {
                damped[(i, i)] += lambda * damped[(i, i)].max(1e-6);
            }

            let rhs = -&gradient;
            let delta = match damped.clone().cholesky() {
                Some(cholesky) => cholesky.solve(&rhs),
                None => match damped.lu().solve(&rhs) {
                    Some(d) => d,
                    None => break,
                },
            };

            if delta.norm() < config.step_tolerance {
                break;
            }

            let trial = retract_all(&poses, &block_of, &delta);
            let trial_error = compute_pose_graph_error(&trial, &edges);

            if trial_error < current_error {
                poses = trial;
                current_error = trial_error;
                lambda = (lambda * lambda_down).max(min_lambda);
            } else {
                lambda = (lambda * lambda_up).min(max_lambda);
            }
        }
    }

    let final_error = compute_pose_graph_error(&poses, &edges);

    PoseGraphResult {
        optimized_poses: problem
            .vertices
            .iter()
            .zip(poses)
            .map(|(v, pose)| (v.local_map, pose))
            .collect(),
        iterations,
        initial_error: initial_error.sqrt(),
        final_error: final_error.sqrt(),
    }
}

/// PHASE 3: Apply optimized poses to the map.
///
/// Contained frames follow their local maps; the robot pose is reset to the
/// keyframe of the current local map.
pub fn apply_pose_graph_result(map: &mut WorldMap, result: &PoseGraphResult) -> Result<usize, MapError> {
    for (local_map, pose) in &result.optimized_poses {
        map.update_local_map(*local_map, *pose)?;
    }

    let keyframe_pose = map
        .current_local_map()
        .and_then(|local_map| map.frame(local_map.keyframe()))
        .map(|keyframe| *keyframe.robot_to_world());
    if let Some(pose) = keyframe_pose {
        map.set_robot_to_world(pose);
    }

    Ok(result.optimized_poses.len())
}

/// Residual `log(Z⁻¹ ∘ T_i⁻¹ ∘ T_j)`, unweighted.
fn edge_error(measurement: &SE3, pose_i: &SE3, pose_j: &SE3) -> Vector6<f64> {
    let predicted = pose_i.inverse().compose(pose_j);
    measurement.inverse().compose(&predicted).log()
}

/// Sum of weighted squared residuals.
fn compute_pose_graph_error(poses: &[SE3], edges: &[(usize, usize, &PoseGraphEdge)]) -> f64 {
    edges
        .iter()
        .map(|(i, j, edge)| {
            edge_error(&edge.measurement, &poses[*i], &poses[*j]).norm_squared() * edge.information
        })
        .sum()
}

/// Accumulate `JᵀJ` and `Jᵀr` per 6x6 block, then scatter into dense storage.
fn build_normal_equations(
    poses: &[SE3],
    edges: &[(usize, usize, &PoseGraphEdge)],
    block_of: &HashMap<usize, usize>,
    n_params: usize,
) -> (DMatrix<f64>, DVector<f64>) {
    let mut blocks: BTreeMap<(usize, usize), Matrix6<f64>> = BTreeMap::new();
    let mut gradient = DVector::zeros(n_params);

    for (i, j, edge) in edges {
        let weight_sqrt = edge.information.sqrt();
        let residual = edge_error(&edge.measurement, &poses[*i], &poses[*j]) * weight_sqrt;

        let jacobian_i = block_of.get(i).map(|&b| {
            let jacobian = numerical_jacobian(|delta| {
                edge_error(&edge.measurement, &poses[*i].retract(delta), &poses[*j])
            });
            (b, jacobian * weight_sqrt)
        });
        let jacobian_j = block_of.get(j).map(|&b| {
            let jacobian = numerical_jacobian(|delta| {
                edge_error(&edge.measurement, &poses[*i], &poses[*j].retract(delta))
            });
            (b, jacobian * weight_sqrt)
        });

        let active: Vec<(usize, Matrix6<f64>)> = jacobian_i.into_iter().chain(jacobian_j).collect();
        for (row_block, row_jacobian) in &active {
            let g = row_jacobian.transpose() * residual;
            let mut segment = gradient.fixed_rows_mut::<6>(row_block * 6);
            segment += g;

            for (col_block, col_jacobian) in &active {
                *blocks
                    .entry((*row_block, *col_block))
                    .or_insert_with(Matrix6::zeros) += row_jacobian.transpose() * col_jacobian;
            }
        }
    }

    let mut hessian = DMatrix::zeros(n_params, n_params);
    for ((row, col), block) in blocks {
        let mut view = hessian.fixed_view_mut::<6, 6>(row * 6, col * 6);
        view += block;
    }

    (hessian, gradient)
}

/// Central differences of a residual function w.r.t. a 6-vector perturbation.
fn numerical_jacobian<F>(residual: F) -> Matrix6<f64>
where
    F: Fn(&Vector6<f64>) -> Vector6<f64>,
{
    let mut jacobian = Matrix6::zeros();
    for p in 0..6 {
        let mut delta = Vector6::zeros();
        delta[p] = JACOBIAN_EPSILON;
        let plus = residual(&delta);
        let minus = residual(&(-delta));
        jacobian.set_column(p, &((plus - minus) / (2.0 * JACOBIAN_EPSILON)));
    }
    jacobian
}

fn retract_all(poses: &[SE3], block_of: &HashMap<usize, usize>, delta: &DVector<f64>) -> Vec<SE3> {
    poses
        .iter()
        .enumerate()
        .map(|(i, pose)| match block_of.get(&i) {
            Some(&b) => pose.retract(&delta.fixed_rows::<6>(b * 6).into_owned()),
            None => *pose,
        })
        .collect()
}

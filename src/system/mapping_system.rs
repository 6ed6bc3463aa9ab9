//! Mapping System - Main entry point and thread orchestration.
//!
//! The `MappingSystem` is the top-level struct that users interact with.
//! Frame ingestion and local map assembly run on the calling thread; pose
//! graph optimization runs on a dedicated worker thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use nalgebra::Vector3;

use crate::config::SystemConfig;
use crate::geometry::SE3;
use crate::io::write_trajectory;
use crate::map::{FrameId, FramePoint, LandmarkId, LocalMapId};
use crate::optimizer::GraphOptimizerConfig;

use super::messages::{BackendMsg, ClosureProposal};
use super::optimizer_worker::OptimizerWorker;
use super::shared_state::SharedState;

/// Capacity of the channel between ingestion and the optimizer worker.
/// When the channel is full, ingestion blocks briefly.
const BACKEND_CHANNEL_CAPACITY: usize = 16;

/// Outcome of ingesting one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutcome {
    pub frame: FrameId,

    /// The local map finalized by this frame, if any.
    pub local_map: Option<LocalMapId>,
}

/// Main mapping system orchestrating ingestion and optimization.
pub struct MappingSystem {
    /// Shared state (WorldMap, flags) accessible by all threads.
    shared: Arc<SharedState>,

    config: SystemConfig,

    /// Channel sender for work items (ingestion -> optimizer).
    sender: Sender<BackendMsg>,

    /// Handle to the optimizer thread.
    optimizer_handle: Option<JoinHandle<()>>,

    local_maps_since_optimization: usize,
}

impl MappingSystem {
    /// Create the shared state and spawn the optimizer thread.
    pub fn new(config: SystemConfig) -> Self {
        let shared = SharedState::new(config.world_map.clone(), config.local_map.clone());
        let (sender, receiver) = bounded::<BackendMsg>(BACKEND_CHANNEL_CAPACITY);
        let optimizer_handle = Self::spawn_optimizer(shared.clone(), receiver, config.optimizer.clone());

        Self {
            shared,
            config,
            sender,
            optimizer_handle: Some(optimizer_handle),
            local_maps_since_optimization: 0,
        }
    }

    fn spawn_optimizer(
        shared: Arc<SharedState>,
        receiver: Receiver<BackendMsg>,
        config: GraphOptimizerConfig,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut worker = OptimizerWorker::new(shared, config);
            worker.run(receiver);
        })
    }

    /// Ingest a frame with its observations and attempt local map creation.
    ///
    /// Observations referencing landmarks must use ids created through
    /// [`MappingSystem::create_landmark`].
    pub fn process_frame(
        &mut self,
        robot_to_world: SE3,
        maximum_depth_close: f64,
        points: Vec<FramePoint>,
    ) -> Result<FrameOutcome> {
        let outcome = {
            let mut map = self.shared.world_map.write();
            let frame = map.create_frame(robot_to_world, maximum_depth_close);
            for point in points {
                map.add_frame_point(frame, point)?;
            }
            let local_map = if map.create_local_map() {
                map.current_local_map().map(|local_map| local_map.id)
            } else {
                None
            };
            FrameOutcome { frame, local_map }
        };

        if outcome.local_map.is_some() {
            self.local_maps_since_optimization += 1;
            let every = self.config.optimize_every_n_local_maps;
            if every > 0 && self.local_maps_since_optimization >= every {
                self.local_maps_since_optimization = 0;
                self.send(BackendMsg::Optimize)?;
            }
        }

        Ok(outcome)
    }

    /// Create a provisional landmark observed in `origin`.
    pub fn create_landmark(&self, origin: FrameId, coordinates: Vector3<f64>) -> Result<LandmarkId> {
        Ok(self.shared.world_map.write().create_landmark(origin, coordinates)?)
    }

    /// Hand a closure to the optimizer worker.
    pub fn propose_closure(&self, proposal: ClosureProposal) -> Result<()> {
        self.send(BackendMsg::Closure(proposal))
    }

    /// Request an optimization independent of closures.
    pub fn request_optimization(&self) -> Result<()> {
        self.send(BackendMsg::Optimize)
    }

    /// Signal a tracking loss.
    pub fn break_track(&mut self) {
        self.shared.world_map.write().break_track();
    }

    /// Get a reference to the shared state.
    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    pub fn robot_to_world(&self) -> SE3 {
        *self.shared.world_map.read().robot_to_world()
    }

    /// Export the trajectory of all frames.
    pub fn save_trajectory(&self, path: Option<&Path>) -> Result<PathBuf> {
        let map = self.shared.world_map.read();
        write_trajectory(&map, path)
    }

    fn send(&self, msg: BackendMsg) -> Result<()> {
        self.sender
            .send(msg)
            .map_err(|_| anyhow!("Optimizer worker is not running"))
    }

    /// Shutdown the system gracefully.
    ///
    /// Pending work items are processed before the worker exits.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.optimizer_handle.take() else {
            return;
        };

        if self.sender.send(BackendMsg::Shutdown).is_err() {
            self.shared.request_shutdown();
        }
        if handle.join().is_err() {
            tracing::warn!("Optimizer thread panicked");
        }
    }
}

impl Drop for MappingSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! OptimizerWorker - Background pose graph optimization thread.
//!
//! The worker:
//! 1. Receives closure proposals and optimization requests
//! 2. Registers closures in the WorldMap
//! 3. Runs the pose graph solve and landmark resolution under the write lock

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::optimizer::{GraphOptimizer, GraphOptimizerConfig};

use super::messages::{BackendMsg, ClosureProposal};
use super::shared_state::SharedState;

/// Timeout for receiving messages from the channel.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Statistics for the optimizer worker.
#[derive(Debug, Default, Clone)]
pub struct OptimizerWorkerStats {
    /// Number of closures registered.
    pub closures_accepted: usize,

    /// Number of closures rejected (unknown local maps).
    pub closures_rejected: usize,

    /// Number of optimizations run.
    pub optimizations: usize,
}

/// The optimizer thread handler.
pub struct OptimizerWorker {
    shared: Arc<SharedState>,
    optimizer: GraphOptimizer,
    stats: OptimizerWorkerStats,
}

impl OptimizerWorker {
    pub fn new(shared: Arc<SharedState>, config: GraphOptimizerConfig) -> Self {
        Self {
            shared,
            optimizer: GraphOptimizer::new(config),
            stats: OptimizerWorkerStats::default(),
        }
    }

    pub fn stats(&self) -> &OptimizerWorkerStats {
        &self.stats
    }

    /// Run the worker loop.
    ///
    /// Blocks until a `Shutdown` message arrives, the channel is closed, or
    /// shutdown is requested through the shared state.
    pub fn run(&mut self, receiver: Receiver<BackendMsg>) {
        tracing::info!("OptimizerWorker thread started");

        loop {
            if self.shared.is_shutdown_requested() {
                break;
            }

            match receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(BackendMsg::Closure(proposal)) => {
                    if self.register_closure(&proposal) {
                        self.optimize();
                    }
                }
                Ok(BackendMsg::Optimize) => self.optimize(),
                Ok(BackendMsg::Shutdown) => break,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::info!("OptimizerWorker channel disconnected");
                    break;
                }
            }
        }

        tracing::info!(
            "OptimizerWorker thread exiting. Stats: closures={}, rejected={}, optimizations={}",
            self.stats.closures_accepted,
            self.stats.closures_rejected,
            self.stats.optimizations
        );
    }

    fn register_closure(&mut self, proposal: &ClosureProposal) -> bool {
        let mut map = self.shared.world_map.write();
        match map.add_loop_closure(
            proposal.query,
            proposal.reference,
            proposal.query_to_reference,
            proposal.omega,
        ) {
            Ok(()) => {
                self.stats.closures_accepted += 1;
                true
            }
            Err(e) => {
                tracing::warn!("Rejected closure {} -> {}: {}", proposal.query, proposal.reference, e);
                self.stats.closures_rejected += 1;
                false
            }
        }
    }

    /// Solve and resolve landmarks while holding the write lock.
    fn optimize(&mut self) {
        let mut map = self.shared.world_map.write();
        match self.optimizer.optimize(&mut map) {
            Ok(Some(_)) => {
                self.stats.optimizations += 1;
                self.shared.record_optimization();
            }
            Ok(None) => tracing::debug!("Nothing to optimize yet"),
            Err(e) => tracing::warn!("Optimization failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use nalgebra::Vector3;

    use crate::geometry::SE3;
    use crate::map::LocalMapId;

    fn shared_with_local_maps(count: usize) -> Arc<SharedState> {
        let shared = Arc::new(SharedState::default());
        {
            let mut map = shared.world_map.write();
            let mut frame = 0;
            while map.num_local_maps() < count {
                map.create_frame(SE3::from_translation(Vector3::new(frame as f64 * 0.2, 0.0, 0.0)), 5.0);
                map.create_local_map();
                frame += 1;
            }
        }
        shared
    }

    #[test]
    fn test_worker_processes_queue_in_order() {
        let shared = shared_with_local_maps(3);
        let (sender, receiver) = bounded(8);

        sender
            .send(BackendMsg::Closure(ClosureProposal {
                query: LocalMapId::new(2),
                reference: LocalMapId::new(0),
                query_to_reference: SE3::from_translation(Vector3::new(1.5, 0.0, 0.0)),
                omega: 1.0,
            }))
            .unwrap();
        sender
            .send(BackendMsg::Closure(ClosureProposal {
                query: LocalMapId::new(7),
                reference: LocalMapId::new(0),
                query_to_reference: SE3::identity(),
                omega: 1.0,
            }))
            .unwrap();
        sender.send(BackendMsg::Optimize).unwrap();
        sender.send(BackendMsg::Shutdown).unwrap();

        let mut worker = OptimizerWorker::new(shared.clone(), GraphOptimizerConfig::default());
        worker.run(receiver);

        assert_eq!(worker.stats().closures_accepted, 1);
        assert_eq!(worker.stats().closures_rejected, 1);
        assert_eq!(worker.stats().optimizations, 2);
        assert_eq!(shared.optimizations_completed(), 2);
        assert_eq!(shared.world_map.read().number_of_closures(), 1);
    }

    #[test]
    fn test_worker_exits_on_disconnect() {
        let shared = shared_with_local_maps(1);
        let (sender, receiver) = bounded::<BackendMsg>(1);
        drop(sender);

        let mut worker = OptimizerWorker::new(shared, GraphOptimizerConfig::default());
        worker.run(receiver);
        assert_eq!(worker.stats().optimizations, 0);
    }
}

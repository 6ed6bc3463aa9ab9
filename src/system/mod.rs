//! Mapping system orchestration and thread management.
//!
//! This module contains the top-level `MappingSystem` that ingests frames on
//! the calling thread and spawns the optimizer worker, along with shared
//! state and inter-thread messaging types.

pub mod messages;
mod mapping_system;
mod optimizer_worker;
pub mod shared_state;

pub use mapping_system::{FrameOutcome, MappingSystem};
pub use messages::{BackendMsg, ClosureProposal};
pub use optimizer_worker::{OptimizerWorker, OptimizerWorkerStats};
pub use shared_state::SharedState;

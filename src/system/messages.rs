//! Inter-thread message types.
//!
//! These types are sent from the ingestion side to the optimizer worker.

use crate::geometry::SE3;
use crate::map::LocalMapId;

/// A loop closure found by the external place recognizer.
#[derive(Debug, Clone)]
pub struct ClosureProposal {
    /// The local map that recognized a previously visited place.
    pub query: LocalMapId,

    /// The previously visited local map.
    pub reference: LocalMapId,

    /// Maps query local map coordinates into the reference local map.
    pub query_to_reference: SE3,

    /// Confidence of the correspondence.
    pub omega: f64,
}

/// Work items for the optimizer worker.
#[derive(Debug, Clone)]
pub enum BackendMsg {
    /// Register a closure, then optimize.
    Closure(ClosureProposal),

    /// Optimize the current pose graph.
    Optimize,

    /// Finish pending work and exit.
    Shutdown,
}

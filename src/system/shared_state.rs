//! Shared state between the ingestion side and the optimizer worker.
//!
//! The `SharedState` struct holds all data that needs to be accessed by
//! multiple threads, protected by appropriate synchronization primitives.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::map::{LocalMapConfig, WorldMap, WorldMapConfig};

/// Shared state accessible by ingestion and the optimizer worker.
pub struct SharedState {
    /// The WorldMap with all frames, local maps and landmarks.
    /// Protected by RwLock: the optimizer holds the write lock for a whole
    /// solve, so no reader ever sees a half-applied result.
    pub world_map: RwLock<WorldMap>,

    /// Request the optimizer worker to exit.
    pub shutdown_requested: AtomicBool,

    /// Number of optimizations completed by the worker.
    pub optimizations_completed: AtomicUsize,
}

impl SharedState {
    /// Create a new SharedState with an empty WorldMap.
    pub fn new(config: WorldMapConfig, local_map_config: LocalMapConfig) -> Arc<Self> {
        Arc::new(Self {
            world_map: RwLock::new(WorldMap::with_config(config, local_map_config)),
            shutdown_requested: AtomicBool::new(false),
            optimizations_completed: AtomicUsize::new(0),
        })
    }

    /// Request shutdown of the optimizer worker.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    /// Check if shutdown was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    pub fn record_optimization(&self) {
        self.optimizations_completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn optimizations_completed(&self) -> usize {
        self.optimizations_completed.load(Ordering::SeqCst)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            world_map: RwLock::new(WorldMap::new()),
            shutdown_requested: AtomicBool::new(false),
            optimizations_completed: AtomicUsize::new(0),
        }
    }
}

//! Map entities and their owner.
//!
//! The WorldMap owns every Frame, LocalMap and Landmark in arenas keyed by
//! typed identifiers; entities reference each other only by id.

pub mod error;
pub mod frame;
pub mod landmark;
pub mod local_map;
pub mod types;
pub mod world_map;

pub use error::MapError;
pub use frame::{Descriptor, Frame, FrameKind, FramePoint};
pub use landmark::{Landmark, LandmarkState};
pub use local_map::{Appearance, Closure, LocalMap, LocalMapConfig};
pub use types::{FrameId, LandmarkId, LocalMapId};
pub use world_map::{WindowPartition, WorldMap, WorldMapConfig};

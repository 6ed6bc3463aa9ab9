//! Errors raised by the entity store when a caller references entities that
//! do not exist.

use thiserror::Error;

use super::types::{FrameId, LandmarkId, LocalMapId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MapError {
    #[error("frame {0} does not exist")]
    UnknownFrame(FrameId),

    #[error("local map {0} does not exist")]
    UnknownLocalMap(LocalMapId),

    #[error("landmark {0} does not exist")]
    UnknownLandmark(LandmarkId),
}

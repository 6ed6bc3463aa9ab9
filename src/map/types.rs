//! Core ID types for the map entities.

/// Unique identifier for a Frame within a WorldMap.
///
/// FrameIds are assigned sequentially by the owning WorldMap when frames are
/// created. They serve as lightweight handles for cross-referencing without
/// Rc/RefCell chains between neighbouring frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u64);

impl FrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Unique identifier for a LocalMap within a WorldMap.
///
/// Consecutive local maps of an unbroken track have adjacent identifiers.
/// A track break makes the counter skip, which is how the pose graph tells
/// a sequential link from a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalMapId(pub u64);

impl LocalMapId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Whether `self` directly follows `previous` without a break in between.
    pub fn is_successor_of(&self, previous: LocalMapId) -> bool {
        self.0.checked_sub(previous.0) == Some(1)
    }
}

impl std::fmt::Display for LocalMapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LM{}", self.0)
    }
}

/// Unique identifier for a Landmark within a WorldMap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LandmarkId(pub u64);

impl LandmarkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_map_successor() {
        let previous = LocalMapId::new(4);

        assert!(LocalMapId::new(5).is_successor_of(previous));
        assert!(!LocalMapId::new(6).is_successor_of(previous));
        assert!(!LocalMapId::new(4).is_successor_of(previous));
        assert!(!LocalMapId::new(3).is_successor_of(previous));
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", FrameId::new(7)), "F7");
        assert_eq!(format!("{}", LocalMapId::new(2)), "LM2");
        assert_eq!(format!("{}", LandmarkId::new(123)), "L123");
    }

    #[test]
    fn test_id_as_hashmap_key() {
        use std::collections::HashMap;

        let mut map: HashMap<LandmarkId, &str> = HashMap::new();
        map.insert(LandmarkId::new(1), "first");
        map.insert(LandmarkId::new(2), "second");

        assert_eq!(map.get(&LandmarkId::new(1)), Some(&"first"));
        assert_eq!(map.get(&LandmarkId::new(3)), None);
    }
}

//! System configuration loaded from YAML.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::map::{LocalMapConfig, WorldMapConfig};
use crate::optimizer::GraphOptimizerConfig;

/// Top-level configuration. Missing keys fall back to their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub world_map: WorldMapConfig,
    pub local_map: LocalMapConfig,
    pub optimizer: GraphOptimizerConfig,

    /// Optimize after this many new local maps. 0 optimizes only after closures.
    pub optimize_every_n_local_maps: usize,
}

impl SystemConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        serde_yaml::from_reader(file).with_context(|| format!("Failed to parse {:?}", path))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.world_map.minimum_distance_traveled_for_local_map, 0.5);
        assert_eq!(config.world_map.minimum_rotation_for_local_map, 0.5);
        assert_eq!(config.world_map.minimum_number_of_frames_for_local_map, 4);
        assert!(!config.world_map.drop_framepoints);
        assert_eq!(config.local_map.minimum_number_of_landmarks, 50);
        assert_eq!(config.optimizer.max_iterations, 10);
        assert_eq!(config.optimize_every_n_local_maps, 0);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "
world_map:
  minimum_rotation_for_local_map: 0.25
  drop_framepoints: true
optimizer:
  max_iterations: 20
optimize_every_n_local_maps: 3
";
        let config = SystemConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.world_map.minimum_rotation_for_local_map, 0.25);
        assert!(config.world_map.drop_framepoints);
        assert_eq!(config.world_map.minimum_number_of_frames_for_local_map, 4);
        assert_eq!(config.optimizer.max_iterations, 20);
        assert_eq!(config.optimizer.closure_information_scale, 10.0);
        assert_eq!(config.optimize_every_n_local_maps, 3);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "local_map:\n  minimum_number_of_landmarks: 80\n").unwrap();

        let config = SystemConfig::from_file(&path).unwrap();
        assert_eq!(config.local_map.minimum_number_of_landmarks, 80);

        assert!(SystemConfig::from_file(dir.path().join("missing.yaml")).is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(SystemConfig::from_yaml_str("optimizer: [1, 2").is_err());
    }
}

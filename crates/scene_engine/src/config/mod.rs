//! Configuration system

use std::path::Path;

pub use serde::{Serialize, Deserialize};

use crate::foundation::logging::warn;
use crate::foundation::math::{constants::MIN_SCALE, Vec3};
use crate::physics::collision::AABB;
use crate::spatial::OctreeConfig;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        // Try different formats
        match extension(path) {
            Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            Some("ron") => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match extension(path) {
            Some("toml") => toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?,
            Some("ron") => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Which spatial index backs a scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IndexKind {
    /// Adaptive octree
    #[default]
    Octree,
    /// Exhaustive list, for tiny scenes and validation
    Linear,
}

/// Settings for a scene world and its spatial index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Entities re-indexed per tick at most
    pub update_budget: usize,
    /// Smallest scale magnitude allowed on any axis
    pub min_scale: f32,
    /// Index implementation
    pub index: IndexKind,
    /// Region covered by the octree root
    pub world_bounds: AABB,
    /// Octree subdivision settings
    pub octree: OctreeConfig,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            update_budget: 1024,
            min_scale: MIN_SCALE,
            index: IndexKind::Octree,
            world_bounds: AABB::new(
                Vec3::new(-1000.0, -1000.0, -1000.0),
                Vec3::new(1000.0, 1000.0, 1000.0),
            ),
            octree: OctreeConfig::default(),
        }
    }
}

impl Config for SpatialConfig {}

impl SpatialConfig {
    /// Replace values that cannot work with usable ones
    ///
    /// Returns whether anything was changed.
    pub fn validate(&mut self) -> bool {
        let defaults = Self::default();
        let mut changed = false;

        if !self.world_bounds.is_valid() {
            warn!("Invalid world bounds {:?}, swapping corners", self.world_bounds);
            let (min, max) = (self.world_bounds.min, self.world_bounds.max);
            self.world_bounds = AABB::new(min.inf(&max), min.sup(&max));
            changed = true;
        }
        if self.octree.max_entities_per_node == 0 {
            warn!("max_entities_per_node must be positive, using {}", defaults.octree.max_entities_per_node);
            self.octree.max_entities_per_node = defaults.octree.max_entities_per_node;
            changed = true;
        }
        if self.octree.min_node_size.is_nan() || self.octree.min_node_size <= 0.0 {
            warn!("min_node_size must be positive, using {}", defaults.octree.min_node_size);
            self.octree.min_node_size = defaults.octree.min_node_size;
            changed = true;
        }
        if self.update_budget == 0 {
            warn!("update_budget must be positive, using {}", defaults.update_budget);
            self.update_budget = defaults.update_budget;
            changed = true;
        }
        if self.min_scale.is_nan() || self.min_scale <= 0.0 {
            warn!("min_scale must be positive, using {}", defaults.min_scale);
            self.min_scale = defaults.min_scale;
            changed = true;
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("scene_engine_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_toml_roundtrip() {
        let path = temp_path("config.toml");
        let mut config = SpatialConfig::default();
        config.update_budget = 64;
        config.index = IndexKind::Linear;

        config.save_to_file(&path).unwrap();
        let loaded = SpatialConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let path = temp_path("partial.ron");
        std::fs::write(&path, "(update_budget: 8, octree: (max_depth: 4))").unwrap();

        let loaded = SpatialConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.update_budget, 8);
        assert_eq!(loaded.octree.max_depth, 4);
        assert_eq!(loaded.octree.max_entities_per_node, 16);
        assert_eq!(loaded.world_bounds, SpatialConfig::default().world_bounds);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = SpatialConfig::default().save_to_file(temp_path("config.json"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validate_repairs_values() {
        let mut config = SpatialConfig {
            world_bounds: AABB::new(Vec3::new(10.0, 10.0, 10.0), Vec3::new(-10.0, -10.0, -10.0)),
            update_budget: 0,
            min_scale: -1.0,
            ..SpatialConfig::default()
        };
        config.octree.max_entities_per_node = 0;

        assert!(config.validate());
        assert_eq!(config.world_bounds.min, Vec3::new(-10.0, -10.0, -10.0));
        assert_eq!(config.update_budget, 1024);
        assert_eq!(config.octree.max_entities_per_node, 16);
        assert!(config.min_scale > 0.0);
        assert!(!config.validate());
    }
}

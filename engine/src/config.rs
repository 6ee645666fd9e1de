//! Cluster lighting configuration. Loaded from a JSON file by tools; the
//! rendering harness may also build it in code.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;
use crate::render::cluster_buffers::ClusterCapacity;
use crate::render::cluster_grid::{ClusterGrid, ClusterProjection};
use crate::render::frame_sync::SyncStrategyKind;
use crate::render::light_population::{LightBounds, LightPopulation};

/// Grid, capacity and culling settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Screen tiles across.
    pub tile_count_x: u32,
    /// Screen tiles down.
    pub tile_count_y: u32,
    /// Strictly increasing view depths where slices split.
    pub depth_slice_boundaries: Vec<f32>,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// LightBuffer capacity.
    pub max_lights: u32,
    /// Reserved LightIndexBuffer slots per cluster.
    pub max_lights_per_cluster: u32,
    /// Bounding sphere radius used for every light.
    pub light_radius: f32,
    pub sync_strategy: SyncStrategyKind,
    pub population: PopulationConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            tile_count_x: 16,
            tile_count_y: 9,
            depth_slice_boundaries: vec![5.0, 20.0, 50.0],
            fov_y_degrees: 60.0,
            near: 0.1,
            far: 200.0,
            max_lights: 1024,
            max_lights_per_cluster: 64,
            light_radius: 4.0,
            sync_strategy: SyncStrategyKind::SingleBuffered,
            population: PopulationConfig::default(),
        }
    }
}

/// Seeded procedural light placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    pub count: usize,
    pub seed: u64,
    pub bounds: LightBounds,
    /// Units per second.
    pub speed: f32,
    pub animated: bool,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            count: 256,
            seed: 7,
            bounds: LightBounds::default(),
            speed: 2.0,
            animated: true,
        }
    }
}

impl ClusterConfig {
    pub fn from_json_str(data: &str) -> ClusterResult<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn to_json_string(&self) -> ClusterResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a JSON file. Errors on a missing or malformed file.
    pub fn load(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Load from a JSON file, falling back to defaults with a warning.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Could not load cluster config {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ClusterResult<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    pub fn projection(&self) -> ClusterProjection {
        ClusterProjection::new(self.fov_y_degrees.to_radians(), self.near, self.far)
    }

    pub fn capacity(&self) -> ClusterResult<ClusterCapacity> {
        ClusterCapacity::new(self.max_lights, self.max_lights_per_cluster)
    }

    /// Build the grid and check that its light slots fit the configured capacity.
    pub fn build_grid(&self, viewport_width: u32, viewport_height: u32) -> ClusterResult<ClusterGrid> {
        let grid = ClusterGrid::initialize_with_projection(
            viewport_width,
            viewport_height,
            self.tile_count_x,
            self.tile_count_y,
            &self.depth_slice_boundaries,
            self.projection(),
        )?;
        self.capacity()?.slot_count(grid.cell_count())?;
        Ok(grid)
    }

    pub fn build_population(&self) -> LightPopulation {
        let p = &self.population;
        let population = LightPopulation::generate(p.count, p.bounds, p.seed);
        if p.animated {
            population.with_motion(p.speed, p.seed)
        } else {
            population
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_scenario_grid() {
        let config = ClusterConfig::default();
        let grid = config.build_grid(1920, 1080).unwrap();
        assert_eq!(grid.cell_count(), 576);
        assert_eq!(config.capacity().unwrap().max_lights_per_cluster(), 64);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ClusterConfig::from_json_str(
            r#"{ "tile_count_x": 32, "sync_strategy": "double_buffered", "population": { "count": 10 } }"#,
        )
        .unwrap();
        assert_eq!(config.tile_count_x, 32);
        assert_eq!(config.tile_count_y, 9);
        assert_eq!(config.sync_strategy, SyncStrategyKind::DoubleBuffered);
        assert_eq!(config.population.count, 10);
        assert_eq!(config.population.seed, 7);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ClusterConfig {
            depth_slice_boundaries: vec![2.0, 8.0],
            ..Default::default()
        };
        let parsed = ClusterConfig::from_json_str(&config.to_json_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_light_slot_overflow_is_a_construction_error() {
        let config = ClusterConfig {
            tile_count_x: 1024,
            tile_count_y: 1024,
            max_lights_per_cluster: 8192,
            ..Default::default()
        };
        assert!(matches!(
            config.build_grid(1920, 1080),
            Err(crate::error::ClusterError::TooManyLightSlots { cell_count: 4_194_304, .. })
        ));
    }

    #[test]
    fn test_bad_json_is_a_config_error() {
        let err = ClusterConfig::from_json_str("{ tile_count_x: }").unwrap_err();
        assert!(matches!(err, crate::error::ClusterError::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = ClusterConfig::load_or_default("/nonexistent/cluster.json");
        assert_eq!(config, ClusterConfig::default());
    }

    #[test]
    fn test_static_population() {
        let config = ClusterConfig {
            population: PopulationConfig {
                animated: false,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(!config.build_population().is_animated());
        assert_eq!(config.build_population().len(), 256);
    }
}

//! Cluster Forward Engine Library
//!
//! Clustered forward light culling for wgpu renderers. The view volume is
//! split into screen tiles × explicit depth slices; a compute pass assigns a
//! large population of point lights to the clusters they overlap, and the
//! forward shading pass reads only its fragment's cluster list.
//!
//! # Modules
//!
//! - [`render`] - Cluster grid, GPU buffers, culling kernel, sync policy, light population, debug output
//! - [`config`] - JSON-loadable grid and capacity settings
//! - [`error`] - The crate error type
//!
//! # Example
//!
//! ```ignore
//! use cluster_forward_engine::{ClusterConfig, ClusteredLighting};
//!
//! let config = ClusterConfig::default();
//! let mut lighting = ClusteredLighting::new(&device, &queue, &config, 1920, 1080)?;
//! let mut population = config.build_population();
//!
//! // Every frame
//! population.step(dt);
//! lighting.upload_lights(&queue, &population.to_gpu(config.max_lights as usize))?;
//! lighting.record_culling(&mut encoder, &queue, camera.view_matrix())?;
//! let bindings = lighting.begin_shading()?;
//! forward_pass.set_bind_group(1, bindings.shading_bind_group, &[]);
//! // ... draw ...
//! lighting.end_shading()?;
//! ```

pub mod config;
pub mod error;
pub mod render;

pub use config::{ClusterConfig, PopulationConfig};
pub use error::{ClusterError, ClusterResult};
// Re-export the render module contents at crate level for convenience
pub use render::*;

//! Light Culling Pass
//!
//! Owns the `cs_cull_lights` compute pipeline and records one dispatch per
//! frame. One workgroup per cluster: the dispatch grid is
//! `(tiles_x * tiles_y, depth_slice_count, 1)` and the kernel recovers the
//! cluster index as `workgroup_id.x + workgroup_id.y * tiles_per_slice`, so
//! the linearization matches `ClusterGrid::linear_index`.
//!
//! The kernel rewrites every TileBuffer entry, so the tile table needs no
//! clear. Only the advisory `CullStats` counters are zeroed each frame.

use super::cluster_buffers::{ClusterBindings, ClusterLayouts};
use super::cluster_grid::ClusterGrid;
use super::shader_loader::{cluster_cull_source, create_shader_module};

/// Threads per workgroup in cluster_cull.wgsl (must match `@workgroup_size`).
pub const CULL_WORKGROUP_SIZE: u32 = 64;

/// Entry point of the culling kernel.
pub const CULL_ENTRY_POINT: &str = "cs_cull_lights";

// Downlevel limit for max_compute_invocations_per_workgroup.
static_assertions::const_assert!(CULL_WORKGROUP_SIZE <= 256);

/// Workgroup counts for a grid: one workgroup per cluster.
pub fn workgroup_counts(grid: &ClusterGrid) -> [u32; 3] {
    [grid.tile_count_x() * grid.tile_count_y(), grid.depth_slice_count(), 1]
}

pub struct LightCullingPass {
    pipeline: wgpu::ComputePipeline,
}

impl LightCullingPass {
    pub fn new(device: &wgpu::Device, layouts: &ClusterLayouts) -> Self {
        let source = cluster_cull_source();
        let module = create_shader_module(device, "cluster_cull", &source);

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cluster_cull_pipeline_layout"),
            bind_group_layouts: &[&layouts.cull],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("cluster_cull_pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(CULL_ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        Self { pipeline }
    }

    /// Record the culling dispatch for one buffer set.
    ///
    /// The LightBuffer and CullParams of the set must already be written
    /// (`ClusterLightBuffers::update` / `write_cull_params`). Dispatches even
    /// with zero lights so every count is rewritten to zero.
    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, bindings: &ClusterBindings<'_>, grid: &ClusterGrid) {
        encoder.clear_buffer(bindings.stats_buffer, 0, None);

        let [x, y, z] = workgroup_counts(grid);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("cluster_cull_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bindings.cull_bind_group, &[]);
        pass.dispatch_workgroups(x, y, z);
    }
}

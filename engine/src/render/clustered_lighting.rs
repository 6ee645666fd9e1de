//! Clustered Lighting
//!
//! Ties the grid, the buffers, the culling pass and the sync policy together
//! for a rendering harness. Per frame:
//!
//! ```text
//! upload_lights → record_culling → begin_shading (bind group 1) → end_shading
//! ```
//!
//! A viewport change only marks the grid dirty. The harness calls
//! `rebuild_if_dirty` between frames; until then culling and shading keep
//! using the old grid, consistently on both sides.

use glam::Mat4;

use super::cluster_buffers::{ClusterBindings, ClusterCapacity, ClusterLayouts, ClusterLightBuffers};
use super::cluster_grid::ClusterGrid;
use super::cluster_layout::{CullStats, GpuLight};
use super::cluster_lists::ClusterLightLists;
use super::frame_sync::{FrameSyncState, SyncBarrierPolicy};
use super::light_culling::{workgroup_counts, LightCullingPass};
use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};

pub struct ClusteredLighting {
    grid: ClusterGrid,
    layouts: ClusterLayouts,
    buffers: ClusterLightBuffers,
    culling: LightCullingPass,
    sync: SyncBarrierPolicy,
    capacity: ClusterCapacity,
    light_radius: f32,
    pending_viewport: Option<(u32, u32)>,
}

impl ClusteredLighting {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        config: &ClusterConfig,
        viewport_width: u32,
        viewport_height: u32,
    ) -> ClusterResult<Self> {
        let grid = config.build_grid(viewport_width, viewport_height)?;
        let capacity = config.capacity()?;
        check_dispatch_limits(&device.limits(), &grid)?;

        let sync = SyncBarrierPolicy::from_kind(config.sync_strategy);
        let layouts = ClusterLayouts::new(device);
        let buffers = ClusterLightBuffers::allocate(device, queue, &layouts, &grid, capacity, sync.set_count())?;
        let culling = LightCullingPass::new(device, &layouts);

        log::info!(
            "[ClusteredLighting] {}x{}x{} grid, {} light(s) per cluster, {}",
            grid.tile_count_x(),
            grid.tile_count_y(),
            grid.depth_slice_count(),
            capacity.max_lights_per_cluster(),
            sync.strategy_name()
        );

        Ok(Self {
            grid,
            layouts,
            buffers,
            culling,
            sync,
            capacity,
            light_radius: config.light_radius,
            pending_viewport: None,
        })
    }

    pub fn grid(&self) -> &ClusterGrid {
        &self.grid
    }

    pub fn buffers(&self) -> &ClusterLightBuffers {
        &self.buffers
    }

    pub fn sync(&self) -> &SyncBarrierPolicy {
        &self.sync
    }

    pub fn light_radius(&self) -> f32 {
        self.light_radius
    }

    pub fn set_light_radius(&mut self, radius: f32) {
        self.light_radius = radius;
    }

    /// Layout for group 1 of the harness's forward shading pipeline.
    pub fn shading_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.layouts.shading
    }

    /// Record a new viewport. The grid is not touched until `rebuild_if_dirty`.
    pub fn resize(&mut self, viewport_width: u32, viewport_height: u32) {
        if self.grid.matches_viewport(viewport_width, viewport_height) {
            self.pending_viewport = None;
        } else {
            self.pending_viewport = Some((viewport_width, viewport_height));
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.pending_viewport.is_some()
    }

    /// Rebuild the grid and reallocate every buffer set for a pending viewport.
    /// Frame numbering restarts. Returns whether a rebuild happened.
    pub fn rebuild_if_dirty(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> ClusterResult<bool> {
        let Some((width, height)) = self.pending_viewport else {
            return Ok(false);
        };
        let grid = self.grid.rebuilt_for_viewport(width, height)?;
        check_dispatch_limits(&device.limits(), &grid)?;
        let buffers =
            ClusterLightBuffers::allocate(device, queue, &self.layouts, &grid, self.capacity, self.sync.set_count())?;

        log::debug!("[ClusteredLighting] rebuilt grid for {}x{}", width, height);
        self.grid = grid;
        self.buffers = buffers;
        self.sync.reset();
        self.pending_viewport = None;
        Ok(true)
    }

    /// Upload lights into the buffer set the next culling dispatch writes.
    pub fn upload_lights(&mut self, queue: &wgpu::Queue, lights: &[GpuLight]) -> ClusterResult<u32> {
        let set = self.sync.next_cull_set();
        self.buffers.update(queue, set, lights)
    }

    /// Record this frame's culling dispatch. Returns the buffer set written.
    pub fn record_culling(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        view: Mat4,
    ) -> ClusterResult<usize> {
        let set = self.sync.begin_culling()?;
        self.buffers.write_cull_params(queue, set, view, self.light_radius)?;
        let bindings = self.buffers.bindings(set)?;
        self.culling.dispatch(encoder, &bindings, &self.grid);
        self.sync.end_culling()?;
        Ok(set)
    }

    /// Bindings the shading pass reads this frame.
    pub fn begin_shading(&mut self) -> ClusterResult<ClusterBindings<'_>> {
        let set = self.sync.begin_shading()?;
        self.buffers.bindings(set)
    }

    pub fn end_shading(&mut self) -> ClusterResult<FrameSyncState> {
        Ok(self.sync.end_shading()?.clone())
    }

    /// Blocking readback of the most recently culled set.
    pub fn read_back_lists(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> ClusterResult<ClusterLightLists> {
        self.buffers
            .read_back_lists(device, queue, self.sync.current_state().cull_set)
    }

    pub fn read_stats(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> ClusterResult<CullStats> {
        let stats = self.buffers.read_stats(device, queue)?;
        if stats.saturated_clusters > 0 {
            log::warn!(
                "[ClusteredLighting] {} cluster(s) saturated, {} light assignment(s) dropped",
                stats.saturated_clusters,
                stats.dropped_lights
            );
        }
        Ok(stats)
    }
}

fn check_dispatch_limits(limits: &wgpu::Limits, grid: &ClusterGrid) -> ClusterResult<()> {
    let limit = limits.max_compute_workgroups_per_dimension;
    let [x, y, _] = workgroup_counts(grid);
    if x > limit || y > limit {
        return Err(ClusterError::DispatchTooLarge { x, y, limit });
    }
    Ok(())
}

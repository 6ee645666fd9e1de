//! Cluster Light Buffers
//!
//! Owns the fixed-capacity GPU buffers that form the contract between the
//! culling kernel and the forward shading consumer:
//!
//! - LightBuffer: `GpuLight[max_lights]`, written by the host every frame
//! - LightIndexBuffer: `u32[cell_count * max_lights_per_cluster]`, one reserved slice per cluster
//! - TileBuffer: `TileEntry[cell_count]`
//!
//! Sizes are derived once from the grid and the capacities; the buffers are
//! overwritten in place every frame and only reallocated on a grid rebuild.
//! With double buffering there is one set of the three buffers per frame
//! parity; the grid uniforms, cull params and stats are shared.
//!
//! ## Bind groups
//!
//! Culling (group 0, compute):
//!   0 uniform ClusterGridUniforms, 1 uniform CullParams, 2 storage<read> lights,
//!   3 storage<read_write> light indices, 4 storage<read_write> tiles,
//!   5 storage<read_write> CullStats
//!
//! Shading (group 1, fragment + compute):
//!   0 uniform ClusterGridUniforms, 1 storage<read> lights,
//!   2 storage<read> light indices, 3 storage<read> tiles

use glam::Mat4;

use super::binding_validator;
use super::cluster_grid::ClusterGrid;
use super::cluster_layout::{
    BufferSizes, CullParams, CullStats, GpuLight, CULL_PARAMS_SIZE, CULL_STATS_SIZE, GRID_UNIFORMS_SIZE,
};
use super::cluster_lists::ClusterLightLists;
use crate::error::{ClusterError, ClusterResult};

/// Capacity constants fixed for the lifetime of a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterCapacity {
    max_lights: u32,
    max_lights_per_cluster: u32,
}

impl ClusterCapacity {
    pub fn new(max_lights: u32, max_lights_per_cluster: u32) -> ClusterResult<Self> {
        if max_lights == 0 {
            return Err(ClusterError::ZeroCapacity { name: "max_lights" });
        }
        if max_lights_per_cluster == 0 {
            return Err(ClusterError::ZeroCapacity {
                name: "max_lights_per_cluster",
            });
        }
        Ok(Self {
            max_lights,
            max_lights_per_cluster,
        })
    }

    pub fn max_lights(&self) -> u32 {
        self.max_lights
    }

    pub fn max_lights_per_cluster(&self) -> u32 {
        self.max_lights_per_cluster
    }

    /// LightIndexBuffer slots for `cell_count` clusters. The kernel addresses
    /// them with a `u32`, so the product must fit one.
    pub fn slot_count(&self, cell_count: u32) -> ClusterResult<u32> {
        cell_count
            .checked_mul(self.max_lights_per_cluster)
            .ok_or(ClusterError::TooManyLightSlots {
                cell_count,
                max_lights_per_cluster: self.max_lights_per_cluster,
            })
    }
}

/// Reject a buffer set the device cannot create or bind as storage.
pub fn check_buffer_limits(sizes: &BufferSizes, limits: &wgpu::Limits) -> ClusterResult<()> {
    let limit = limits.max_buffer_size.min(limits.max_storage_buffer_binding_size as u64);
    for (name, size) in [
        ("light_buffer", sizes.light_buffer),
        ("light_index_buffer", sizes.light_index_buffer),
        ("tile_buffer", sizes.tile_buffer),
    ] {
        if size > limit {
            return Err(ClusterError::BufferTooLarge { name, size, limit });
        }
    }
    Ok(())
}

// ============================================================================
// Layout entries
// ============================================================================

fn buffer_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    ty: wgpu::BufferBindingType,
    min_size: u64,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: wgpu::BufferSize::new(min_size),
        },
        count: None,
    }
}

/// Group 0 of `cs_cull_lights`.
pub fn cull_layout_entries() -> [wgpu::BindGroupLayoutEntry; 6] {
    let cs = wgpu::ShaderStages::COMPUTE;
    let read = wgpu::BufferBindingType::Storage { read_only: true };
    let read_write = wgpu::BufferBindingType::Storage { read_only: false };
    [
        buffer_entry(0, cs, wgpu::BufferBindingType::Uniform, GRID_UNIFORMS_SIZE),
        buffer_entry(1, cs, wgpu::BufferBindingType::Uniform, CULL_PARAMS_SIZE),
        buffer_entry(2, cs, read, 0),
        buffer_entry(3, cs, read_write, 0),
        buffer_entry(4, cs, read_write, 0),
        buffer_entry(5, cs, read_write, CULL_STATS_SIZE),
    ]
}

/// Group 1 of any shader that includes `cluster_shading.wgsl`.
pub fn shading_layout_entries() -> [wgpu::BindGroupLayoutEntry; 4] {
    let stages = wgpu::ShaderStages::FRAGMENT | wgpu::ShaderStages::COMPUTE;
    let read = wgpu::BufferBindingType::Storage { read_only: true };
    [
        buffer_entry(0, stages, wgpu::BufferBindingType::Uniform, GRID_UNIFORMS_SIZE),
        buffer_entry(1, stages, read, 0),
        buffer_entry(2, stages, read, 0),
        buffer_entry(3, stages, read, 0),
    ]
}

/// Bind group layouts for both sides, created once per device.
pub struct ClusterLayouts {
    pub cull: wgpu::BindGroupLayout,
    pub shading: wgpu::BindGroupLayout,
    /// Mismatches found against the WGSL declarations (0 when healthy)
    pub binding_mismatches: u32,
}

impl ClusterLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let cull_entries = cull_layout_entries();
        let shading_entries = shading_layout_entries();
        let binding_mismatches = binding_validator::validate_cluster_bindings(&cull_entries, &shading_entries);

        let cull = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cluster_cull_bind_group_layout"),
            entries: &cull_entries,
        });
        let shading = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cluster_shading_bind_group_layout"),
            entries: &shading_entries,
        });

        Self {
            cull,
            shading,
            binding_mismatches,
        }
    }
}

// ============================================================================
// Buffer sets
// ============================================================================

/// One LightBuffer + LightIndexBuffer + TileBuffer and the bind groups over them.
pub struct ClusterBufferSet {
    pub light_buffer: wgpu::Buffer,
    pub light_index_buffer: wgpu::Buffer,
    pub tile_buffer: wgpu::Buffer,
    cull_bind_group: wgpu::BindGroup,
    shading_bind_group: wgpu::BindGroup,
    light_count: u32,
}

impl ClusterBufferSet {
    /// Lights uploaded by the last `update` into this set.
    pub fn light_count(&self) -> u32 {
        self.light_count
    }
}

/// Handles for one buffer set, consumed by the culling pass and the shading pass.
#[derive(Clone, Copy)]
pub struct ClusterBindings<'a> {
    pub set_index: usize,
    /// Group 0 of the culling kernel
    pub cull_bind_group: &'a wgpu::BindGroup,
    /// Group 1 of the shading consumer
    pub shading_bind_group: &'a wgpu::BindGroup,
    pub light_buffer: &'a wgpu::Buffer,
    pub light_index_buffer: &'a wgpu::Buffer,
    pub tile_buffer: &'a wgpu::Buffer,
    pub grid_uniform_buffer: &'a wgpu::Buffer,
    pub stats_buffer: &'a wgpu::Buffer,
}

pub struct ClusterLightBuffers {
    grid_uniform_buffer: wgpu::Buffer,
    cull_params_buffer: wgpu::Buffer,
    stats_buffer: wgpu::Buffer,
    sets: Vec<ClusterBufferSet>,
    sizes: BufferSizes,
    capacity: ClusterCapacity,
    cell_count: u32,
}

impl ClusterLightBuffers {
    /// Size and create `set_count` buffer sets for `grid`. The grid uniforms are
    /// written here once; the grid is immutable so they never change.
    pub fn allocate(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &ClusterLayouts,
        grid: &ClusterGrid,
        capacity: ClusterCapacity,
        set_count: usize,
    ) -> ClusterResult<Self> {
        if set_count == 0 {
            return Err(ClusterError::ZeroCapacity { name: "set_count" });
        }
        let cell_count = grid.cell_count();
        capacity.slot_count(cell_count)?;
        let sizes = BufferSizes::compute(cell_count, capacity.max_lights(), capacity.max_lights_per_cluster());
        check_buffer_limits(&sizes, &device.limits())?;

        let grid_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster_grid_uniforms"),
            size: GRID_UNIFORMS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        queue.write_buffer(&grid_uniform_buffer, 0, bytemuck::bytes_of(grid.uniforms()));

        let cull_params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster_cull_params"),
            size: CULL_PARAMS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let stats_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cluster_cull_stats"),
            size: CULL_STATS_SIZE,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sets = (0..set_count)
            .map(|i| {
                Self::create_set(
                    device,
                    layouts,
                    i,
                    &sizes,
                    &grid_uniform_buffer,
                    &cull_params_buffer,
                    &stats_buffer,
                )
            })
            .collect();

        log::info!(
            "[ClusterLightBuffers] {} set(s) for {} clusters: lights {} B, indices {} B, tiles {} B ({} B per set)",
            set_count,
            cell_count,
            sizes.light_buffer,
            sizes.light_index_buffer,
            sizes.tile_buffer,
            sizes.total()
        );

        Ok(Self {
            grid_uniform_buffer,
            cull_params_buffer,
            stats_buffer,
            sets,
            sizes,
            capacity,
            cell_count,
        })
    }

    fn create_set(
        device: &wgpu::Device,
        layouts: &ClusterLayouts,
        index: usize,
        sizes: &BufferSizes,
        grid_uniform_buffer: &wgpu::Buffer,
        cull_params_buffer: &wgpu::Buffer,
        stats_buffer: &wgpu::Buffer,
    ) -> ClusterBufferSet {
        let light_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("cluster_light_buffer_{}", index)),
            size: sizes.light_buffer,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let light_index_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("cluster_light_index_buffer_{}", index)),
            size: sizes.light_index_buffer,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let tile_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("cluster_tile_buffer_{}", index)),
            size: sizes.tile_buffer,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let cull_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("cluster_cull_bind_group_{}", index)),
            layout: &layouts.cull,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: grid_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: cull_params_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: light_index_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: tile_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: stats_buffer.as_entire_binding(),
                },
            ],
        });

        let shading_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("cluster_shading_bind_group_{}", index)),
            layout: &layouts.shading,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: grid_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: light_index_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: tile_buffer.as_entire_binding(),
                },
            ],
        });

        ClusterBufferSet {
            light_buffer,
            light_index_buffer,
            tile_buffer,
            cull_bind_group,
            shading_bind_group,
            light_count: 0,
        }
    }

    pub fn sizes(&self) -> BufferSizes {
        self.sizes
    }

    pub fn capacity(&self) -> ClusterCapacity {
        self.capacity
    }

    pub fn cell_count(&self) -> u32 {
        self.cell_count
    }

    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    pub fn set(&self, index: usize) -> ClusterResult<&ClusterBufferSet> {
        self.sets.get(index).ok_or(ClusterError::InvalidBufferSet {
            index,
            count: self.sets.len(),
        })
    }

    /// Copy the current lights into a set's LightBuffer. Lights beyond
    /// `max_lights` are not uploaded. Returns the uploaded count.
    pub fn update(&mut self, queue: &wgpu::Queue, set_index: usize, lights: &[GpuLight]) -> ClusterResult<u32> {
        let max_lights = self.capacity.max_lights() as usize;
        let count = self.sets.len();
        let set = self
            .sets
            .get_mut(set_index)
            .ok_or(ClusterError::InvalidBufferSet { index: set_index, count })?;

        if lights.len() > max_lights {
            log::warn!(
                "[ClusterLightBuffers] {} lights exceed capacity {}, uploading the first {}",
                lights.len(),
                max_lights,
                max_lights
            );
        }
        let uploaded = &lights[..lights.len().min(max_lights)];
        if !uploaded.is_empty() {
            queue.write_buffer(&set.light_buffer, 0, bytemuck::cast_slice(uploaded));
        }
        set.light_count = uploaded.len() as u32;
        Ok(set.light_count)
    }

    /// Write the per-frame culling inputs for a set about to be culled.
    pub fn write_cull_params(
        &self,
        queue: &wgpu::Queue,
        set_index: usize,
        view: Mat4,
        light_radius: f32,
    ) -> ClusterResult<CullParams> {
        let set = self.set(set_index)?;
        let params = CullParams::new(
            view,
            set.light_count,
            self.capacity.max_lights_per_cluster(),
            light_radius,
        );
        queue.write_buffer(&self.cull_params_buffer, 0, bytemuck::bytes_of(&params));
        Ok(params)
    }

    /// Opaque handles for one set.
    pub fn bindings(&self, set_index: usize) -> ClusterResult<ClusterBindings<'_>> {
        let set = self.set(set_index)?;
        Ok(ClusterBindings {
            set_index,
            cull_bind_group: &set.cull_bind_group,
            shading_bind_group: &set.shading_bind_group,
            light_buffer: &set.light_buffer,
            light_index_buffer: &set.light_index_buffer,
            tile_buffer: &set.tile_buffer,
            grid_uniform_buffer: &self.grid_uniform_buffer,
            stats_buffer: &self.stats_buffer,
        })
    }

    // ------------------------------------------------------------------------
    // Debug readback. Stalls the queue; on demand only.
    // ------------------------------------------------------------------------

    /// Copy a set's TileBuffer and LightIndexBuffer back to the host.
    pub fn read_back_lists(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        set_index: usize,
    ) -> ClusterResult<ClusterLightLists> {
        let set = self.set(set_index)?;
        let tile_bytes = read_buffer(device, queue, &set.tile_buffer, self.sizes.tile_buffer)?;
        let index_bytes = read_buffer(device, queue, &set.light_index_buffer, self.sizes.light_index_buffer)?;
        Ok(ClusterLightLists::from_bytes(
            &tile_bytes,
            &index_bytes,
            self.capacity.max_lights_per_cluster(),
        ))
    }

    /// Read the advisory saturation counters of the last dispatch.
    pub fn read_stats(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> ClusterResult<CullStats> {
        let bytes = read_buffer(device, queue, &self.stats_buffer, CULL_STATS_SIZE)?;
        Ok(bytemuck::pod_read_unaligned(&bytes))
    }
}

/// Blocking copy of `size` bytes of `source` into host memory.
fn read_buffer(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer, size: u64) -> ClusterResult<Vec<u8>> {
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("cluster_readback_staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("cluster_readback_encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .map_err(|e| ClusterError::Readback(e.to_string()))?;
    rx.recv()
        .map_err(|e| ClusterError::Readback(e.to_string()))?
        .map_err(|e| ClusterError::Readback(e.to_string()))?;

    let bytes = slice.get_mapped_range().to_vec();
    staging.unmap();
    Ok(bytes)
}

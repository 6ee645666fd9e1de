//! Cluster GPU Buffer Layouts
//!
//! Host/device shared structs for the clustered light culling system. Every
//! struct here has a WGSL twin in `shaders/cluster_common.wgsl` or
//! `shaders/cluster_cull.wgsl`; the layouts are binary contracts, so each one
//! carries a compile-time size assertion.
//!
//! ## Buffers
//!
//! | Buffer           | Entry                               | Length                        |
//! |------------------|-------------------------------------|-------------------------------|
//! | LightBuffer      | `GpuLight` (32 bytes)               | max_lights                    |
//! | LightIndexBuffer | `u32` light index                   | cell_count × max_per_cluster  |
//! | TileBuffer       | `TileEntry` (8 bytes)               | cell_count                    |
//!
//! The grid parameters travel separately in `ClusterGridUniforms`, a small
//! uniform block bound by both the culling kernel and the shading consumer.

use glam::{Mat4, Vec3, Vec4};
use static_assertions::const_assert_eq;

/// Most depth slices the shared constant block can describe.
pub const MAX_DEPTH_SLICES: usize = 32;

/// Most explicit depth boundaries (one less than the slice count).
pub const MAX_DEPTH_BOUNDARIES: usize = MAX_DEPTH_SLICES - 1;

/// Boundaries are packed four to a `vec4<f32>` for uniform-buffer stride rules.
pub const BOUNDARY_VEC4_COUNT: usize = MAX_DEPTH_SLICES / 4;

// ============================================================================
// GpuLight - one entry of the LightBuffer
// ============================================================================

/// GPU mirror of a point light.
///
/// WGSL Layout (32 bytes):
///   offset  0: position (vec3<f32>)
///   offset 12: _pad (f32)
///   offset 16: color_intensity (vec4<f32>) - rgb color, w = intensity
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuLight {
    /// World-space position
    pub position: [f32; 3],
    /// Padding so color_intensity starts on a 16-byte row
    pub _pad: f32,
    /// RGB color in xyz, intensity in w
    pub color_intensity: [f32; 4],
}

impl GpuLight {
    pub fn new(position: Vec3, color_intensity: Vec4) -> Self {
        Self {
            position: position.to_array(),
            _pad: 0.0,
            color_intensity: color_intensity.to_array(),
        }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

// ============================================================================
// TileEntry - one entry of the TileBuffer
// ============================================================================

/// Per-cluster (count, offset) pair.
///
/// WGSL Layout (8 bytes):
///   offset 0: count (u32)  - valid light indices in this cluster's slice
///   offset 4: offset (u32) - first slot of the slice in the LightIndexBuffer
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileEntry {
    pub count: u32,
    pub offset: u32,
}

impl TileEntry {
    pub fn new(count: u32, offset: u32) -> Self {
        Self { count, offset }
    }
}

// ============================================================================
// ClusterGridUniforms - the shared constant block
// ============================================================================

/// Grid constants shared by the culling kernel and the shading consumer.
///
/// Both `ClusterGrid::cluster_index` on the CPU and `cluster_index()` in WGSL
/// are written against this block, so the two sides can never disagree on the
/// linearization or the slice boundaries.
///
/// WGSL Layout (176 bytes):
///   Row 0 (offset  0): tile_count_x, tile_count_y, depth_slice_count, cell_count (u32)
///   Row 1 (offset 16): viewport_width, viewport_height, tan_half_fov_y, aspect (f32)
///   Row 2 (offset 32): near, far (f32), boundary_count, _pad (u32)
///   Rows 3-10 (offset 48): boundaries, array<vec4<f32>, 8>
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClusterGridUniforms {
    pub tile_count_x: u32,
    pub tile_count_y: u32,
    pub depth_slice_count: u32,
    pub cell_count: u32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub tan_half_fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub boundary_count: u32,
    pub _pad: u32,
    pub boundaries: [[f32; 4]; BOUNDARY_VEC4_COUNT],
}

impl ClusterGridUniforms {
    /// Depth boundary `i`, read from the packed vec4 rows.
    #[inline]
    pub fn boundary(&self, i: u32) -> f32 {
        self.boundaries[(i / 4) as usize][(i % 4) as usize]
    }

    /// Pack a boundary list into the vec4 rows. Unused lanes stay zero.
    pub fn pack_boundaries(boundaries: &[f32]) -> [[f32; 4]; BOUNDARY_VEC4_COUNT] {
        let mut packed = [[0.0f32; 4]; BOUNDARY_VEC4_COUNT];
        for (i, b) in boundaries.iter().take(MAX_DEPTH_BOUNDARIES).enumerate() {
            packed[i / 4][i % 4] = *b;
        }
        packed
    }

    #[inline]
    pub fn tiles_per_slice(&self) -> u32 {
        self.tile_count_x * self.tile_count_y
    }
}

// ============================================================================
// CullParams - per-frame culling inputs
// ============================================================================

/// Per-frame uniforms for the culling kernel.
///
/// WGSL Layout (80 bytes):
///   offset  0: view (mat4x4<f32>) - world to view transform, column-major
///   offset 64: light_count (u32)
///   offset 68: max_lights_per_cluster (u32)
///   offset 72: light_radius (f32) - bounding sphere radius for every light
///   offset 76: _pad (u32)
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullParams {
    pub view: [[f32; 4]; 4],
    pub light_count: u32,
    pub max_lights_per_cluster: u32,
    pub light_radius: f32,
    pub _pad: u32,
}

impl CullParams {
    pub fn new(view: Mat4, light_count: u32, max_lights_per_cluster: u32, light_radius: f32) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            light_count,
            max_lights_per_cluster,
            light_radius,
            _pad: 0,
        }
    }
}

// ============================================================================
// CullStats - advisory saturation counters
// ============================================================================

/// Advisory counters written by the culling kernel. Cleared every frame.
///
/// WGSL Layout (16 bytes):
///   offset 0: saturated_clusters (atomic<u32>)
///   offset 4: dropped_lights (atomic<u32>)
///   offset 8: _pad0, _pad1 (u32)
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullStats {
    pub saturated_clusters: u32,
    pub dropped_lights: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

// ============================================================================
// Buffer sizes
// ============================================================================

pub const GPU_LIGHT_SIZE: u64 = std::mem::size_of::<GpuLight>() as u64;
pub const TILE_ENTRY_SIZE: u64 = std::mem::size_of::<TileEntry>() as u64;
pub const LIGHT_INDEX_SIZE: u64 = std::mem::size_of::<u32>() as u64;
pub const GRID_UNIFORMS_SIZE: u64 = std::mem::size_of::<ClusterGridUniforms>() as u64;
pub const CULL_PARAMS_SIZE: u64 = std::mem::size_of::<CullParams>() as u64;
pub const CULL_STATS_SIZE: u64 = std::mem::size_of::<CullStats>() as u64;

/// Byte sizes of one buffer set, derived once from the grid and capacities.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferSizes {
    pub light_buffer: u64,
    pub light_index_buffer: u64,
    pub tile_buffer: u64,
}

impl BufferSizes {
    pub fn compute(cell_count: u32, max_lights: u32, max_lights_per_cluster: u32) -> Self {
        Self {
            light_buffer: max_lights as u64 * GPU_LIGHT_SIZE,
            light_index_buffer: cell_count as u64 * max_lights_per_cluster as u64 * LIGHT_INDEX_SIZE,
            tile_buffer: cell_count as u64 * TILE_ENTRY_SIZE,
        }
    }

    /// Bytes for one set (lights + index table + tile table).
    pub fn total(&self) -> u64 {
        self.light_buffer + self.light_index_buffer + self.tile_buffer
    }
}

// ============================================================================
// Compile-time Size Assertions
// ============================================================================

const_assert_eq!(std::mem::size_of::<GpuLight>(), 32);
const_assert_eq!(std::mem::size_of::<TileEntry>(), 8);
const_assert_eq!(std::mem::size_of::<ClusterGridUniforms>(), 48 + 16 * BOUNDARY_VEC4_COUNT);
const_assert_eq!(std::mem::size_of::<CullParams>(), 80);
const_assert_eq!(std::mem::size_of::<CullStats>(), 16);

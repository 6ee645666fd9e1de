//! CPU Light Culling
//!
//! Software counterpart of `cluster_cull.wgsl` with the same output contract:
//! a TileBuffer of `(count, cluster * max_lights_per_cluster)` entries and a
//! LightIndexBuffer whose reserved slices hold only intersecting lights.
//!
//! The GPU kernel runs one workgroup per cluster. Here the work is scattered
//! per light instead (rayon over lights), and each light only visits slices
//! its sphere reaches in depth. Appends go
//! through fixed-capacity `AtomicU32` counters that saturate inside the
//! counter, so no cluster ever holds more than `max_lights_per_cluster`.
//!
//! Used as the fallback when no compute-capable adapter exists and as the
//! oracle the GPU path is tested against.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use glam::{Mat4, Vec3};
use rayon::prelude::*;

use super::cluster_grid::{ClusterAabb, ClusterGrid};
use super::cluster_layout::{CullStats, GpuLight, TileEntry};
use super::cluster_lists::ClusterLightLists;

/// Output of one CPU culling run.
#[derive(Clone, Debug)]
pub struct CpuCullOutput {
    pub lists: ClusterLightLists,
    pub stats: CullStats,
}

/// Culls lights against a grid whose cluster bounds were computed once.
///
/// Rebuild the culler whenever the grid is rebuilt.
#[derive(Clone, Debug)]
pub struct CpuLightCuller {
    bounds: Vec<ClusterAabb>,
    /// View-space z range `[min_z, max_z]` shared by every cluster of a slice
    slice_z: Vec<(f32, f32)>,
    tiles_per_slice: u32,
    max_lights_per_cluster: u32,
}

impl CpuLightCuller {
    pub fn new(grid: &ClusterGrid, max_lights_per_cluster: u32) -> Self {
        let slice_z = (0..grid.depth_slice_count())
            .map(|s| {
                let (near, far) = grid.slice_depth_range(s);
                (-far, -near)
            })
            .collect();
        Self {
            bounds: grid.all_cluster_bounds(),
            slice_z,
            tiles_per_slice: grid.uniforms().tiles_per_slice(),
            max_lights_per_cluster,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.bounds.len()
    }

    /// Assign `lights` (world space) to clusters, viewed through `view`.
    pub fn cull(&self, lights: &[GpuLight], view: Mat4, light_radius: f32) -> CpuCullOutput {
        let cell_count = self.bounds.len();
        let max = self.max_lights_per_cluster;

        let counters: Vec<AtomicU32> = (0..cell_count).map(|_| AtomicU32::new(0)).collect();
        let slots: Vec<AtomicU32> = (0..cell_count * max as usize)
            .map(|_| AtomicU32::new(0))
            .collect();
        let overflowed: Vec<AtomicBool> = (0..cell_count).map(|_| AtomicBool::new(false)).collect();
        let saturated_clusters = AtomicU32::new(0);
        let dropped_lights = AtomicU32::new(0);

        let radius_sq = light_radius * light_radius;

        lights.par_iter().enumerate().for_each(|(light_index, light)| {
            let center = view.transform_point3(light.position());
            for (slice, &(min_z, max_z)) in self.slice_z.iter().enumerate() {
                // Same dz term as the full test, so skipping here never drops a hit.
                let dz = center.z - center.z.clamp(min_z, max_z);
                if dz * dz > radius_sq {
                    continue;
                }
                let first = slice as u32 * self.tiles_per_slice;
                for cluster in first..first + self.tiles_per_slice {
                    if !self.bounds[cluster as usize].intersects_sphere(center, light_radius) {
                        continue;
                    }
                    let c = cluster as usize;
                    let reserved = counters[c].fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                        (n < max).then_some(n + 1)
                    });
                    match reserved {
                        Ok(slot) => {
                            slots[c * max as usize + slot as usize].store(light_index as u32, Ordering::Relaxed);
                        }
                        Err(_) => {
                            dropped_lights.fetch_add(1, Ordering::Relaxed);
                            if !overflowed[c].swap(true, Ordering::Relaxed) {
                                saturated_clusters.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                }
            }
        });

        let tiles = counters
            .into_iter()
            .enumerate()
            .map(|(c, count)| TileEntry::new(count.into_inner(), c as u32 * max))
            .collect();
        let light_indices = slots.into_iter().map(AtomicU32::into_inner).collect();

        let stats = CullStats {
            saturated_clusters: saturated_clusters.into_inner(),
            dropped_lights: dropped_lights.into_inner(),
            ..Default::default()
        };
        if stats.saturated_clusters > 0 {
            log::debug!(
                "[CpuLightCuller] {} clusters saturated, {} assignments dropped",
                stats.saturated_clusters,
                stats.dropped_lights
            );
        }

        CpuCullOutput {
            lists: ClusterLightLists::from_parts(tiles, light_indices, max),
            stats,
        }
    }
}

/// One-shot culling. Prefer [`CpuLightCuller`] when culling every frame.
pub fn cull_lights_cpu(
    grid: &ClusterGrid,
    lights: &[GpuLight],
    view: Mat4,
    max_lights_per_cluster: u32,
    light_radius: f32,
) -> CpuCullOutput {
    CpuLightCuller::new(grid, max_lights_per_cluster).cull(lights, view, light_radius)
}

/// Light position in view space, as the kernel sees it.
#[inline]
pub fn view_space_position(view: Mat4, light: &GpuLight) -> Vec3 {
    view.transform_point3(light.position())
}

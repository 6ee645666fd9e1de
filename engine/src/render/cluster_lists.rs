//! Host mirror of the TileBuffer and LightIndexBuffer.
//!
//! Produced by the CPU culler or by reading the GPU buffers back. Both tables
//! keep their fixed device layout: slot `c * max_lights_per_cluster + k` holds
//! the k-th light of cluster `c`, and only the first `count` slots are valid.

use super::cluster_grid::ClusterGrid;
use super::cluster_layout::TileEntry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterLightLists {
    tiles: Vec<TileEntry>,
    light_indices: Vec<u32>,
    max_lights_per_cluster: u32,
}

impl ClusterLightLists {
    pub fn from_parts(tiles: Vec<TileEntry>, light_indices: Vec<u32>, max_lights_per_cluster: u32) -> Self {
        Self {
            tiles,
            light_indices,
            max_lights_per_cluster,
        }
    }

    /// Rebuild from raw buffer bytes as mapped from the device.
    pub fn from_bytes(tile_bytes: &[u8], index_bytes: &[u8], max_lights_per_cluster: u32) -> Self {
        Self {
            tiles: bytemuck::pod_collect_to_vec(tile_bytes),
            light_indices: bytemuck::pod_collect_to_vec(index_bytes),
            max_lights_per_cluster,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn max_lights_per_cluster(&self) -> u32 {
        self.max_lights_per_cluster
    }

    pub fn tiles(&self) -> &[TileEntry] {
        &self.tiles
    }

    pub fn light_indices(&self) -> &[u32] {
        &self.light_indices
    }

    /// Tile entry of a cluster, zeroed if the index is out of range.
    pub fn tile(&self, cluster: u32) -> TileEntry {
        self.tiles.get(cluster as usize).copied().unwrap_or_default()
    }

    pub fn count(&self, cluster: u32) -> u32 {
        self.tile(cluster).count
    }

    /// The valid part of a cluster's reserved slice. Order is unspecified.
    pub fn lights(&self, cluster: u32) -> &[u32] {
        let entry = self.tile(cluster);
        let start = entry.offset as usize;
        let len = entry.count.min(self.max_lights_per_cluster) as usize;
        self.light_indices.get(start..start + len).unwrap_or(&[])
    }

    /// A cluster's lights in ascending order, for set comparisons.
    pub fn sorted_lights(&self, cluster: u32) -> Vec<u32> {
        let mut lights = self.lights(cluster).to_vec();
        lights.sort_unstable();
        lights
    }

    /// What a forward-shaded fragment would iterate.
    pub fn lights_for_fragment(&self, grid: &ClusterGrid, screen_x: f32, screen_y: f32, view_depth: f32) -> &[u32] {
        self.lights(grid.cluster_index(screen_x, screen_y, view_depth))
    }

    pub fn counts(&self) -> Vec<u32> {
        self.tiles.iter().map(|t| t.count).collect()
    }

    /// Clusters whose list filled up.
    pub fn saturated_clusters(&self) -> usize {
        self.tiles
            .iter()
            .filter(|t| t.count >= self.max_lights_per_cluster)
            .count()
    }

    pub fn total_assignments(&self) -> u64 {
        self.tiles.iter().map(|t| t.count as u64).sum()
    }

    pub fn max_count(&self) -> u32 {
        self.tiles.iter().map(|t| t.count).max().unwrap_or(0)
    }

    pub fn non_empty_clusters(&self) -> usize {
        self.tiles.iter().filter(|t| t.count > 0).count()
    }
}

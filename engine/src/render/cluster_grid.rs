//! Cluster Grid
//!
//! Partitions the view volume into `tile_count_x × tile_count_y × depth_slice_count`
//! cells ("clusters", a.k.a. froxels):
//! - X/Y: screen-space tiles of `viewport / tile_count` pixels
//! - Z: explicit depth slices `[0, b0), [b0, b1), ..., [bN-1, +inf)`
//!
//! The boundaries are explicit rather than uniform or exponential because scene
//! depth density is uneven; the caller places slices where the lights are.
//!
//! ## Coordinate System
//!
//! - View space is right-handed, the camera looks toward -Z; `view_depth = -z_view`
//! - Screen coordinates are pixels with the origin at the top-left, so tile row 0
//!   is the top row of the screen
//! - Linear index: `slice * (tiles_x * tiles_y) + tile_y * tiles_x + tile_x`
//!
//! The grid is immutable. A viewport change requires a new grid via
//! [`ClusterGrid::rebuilt_for_viewport`]; querying a grid built for a different
//! viewport returns answers for the old viewport. That staleness is the
//! caller's responsibility and is never patched here.

use glam::{Mat4, Vec3};

use super::cluster_layout::{
    ClusterGridUniforms, MAX_DEPTH_BOUNDARIES, MAX_DEPTH_SLICES,
};
use crate::error::{ClusterError, ClusterResult};

/// Projection parameters used to turn tiles into view-space bounds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterProjection {
    /// Vertical field of view in radians
    pub fov_y: f32,
    /// Near clip distance. Slice 0 bounds start here; nothing in front of it is visible.
    pub near: f32,
    /// Far clip distance. Closes the open-ended last slice.
    pub far: f32,
}

impl Default for ClusterProjection {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::FRAC_PI_3, // 60 degrees
            near: 0.1,
            far: 200.0,
        }
    }
}

impl ClusterProjection {
    pub fn new(fov_y: f32, near: f32, far: f32) -> Self {
        Self { fov_y, near, far }
    }

    /// Right-handed perspective matrix matching the grid's tiles.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far)
    }

    fn validate(&self, boundaries: &[f32]) -> ClusterResult<()> {
        if !(self.fov_y > 0.0 && self.fov_y < std::f32::consts::PI) {
            return Err(ClusterError::InvalidProjection(format!(
                "fov_y {} must be in (0, pi)",
                self.fov_y
            )));
        }
        if !(self.near > 0.0 && self.near.is_finite()) {
            return Err(ClusterError::InvalidProjection(format!(
                "near {} must be positive",
                self.near
            )));
        }
        if !(self.far > self.near && self.far.is_finite()) {
            return Err(ClusterError::InvalidProjection(format!(
                "far {} must be greater than near {}",
                self.far, self.near
            )));
        }
        if let Some(&first) = boundaries.first() {
            if first <= self.near {
                return Err(ClusterError::InvalidProjection(format!(
                    "first depth boundary {} must lie beyond near {}",
                    first, self.near
                )));
            }
        }
        if let Some(&last) = boundaries.last() {
            if last >= self.far {
                return Err(ClusterError::InvalidProjection(format!(
                    "last depth boundary {} must lie before far {}",
                    last, self.far
                )));
            }
        }
        Ok(())
    }
}

/// View-space axis-aligned bounds of one cluster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClusterAabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl ClusterAabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[inline]
    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Closest-point sphere test, identical to `sphere_intersects_aabb` in WGSL.
    #[inline]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.clamp(self.min, self.max);
        let d = center - closest;
        d.dot(d) <= radius * radius
    }
}

/// Pixel rectangle covered by a tile, `[x0, x1) × [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl ScreenRect {
    pub fn area(&self) -> f32 {
        (self.x1 - self.x0) * (self.y1 - self.y0)
    }

    /// True when the interiors overlap. Shared edges do not count.
    pub fn overlaps(&self, other: &ScreenRect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }
}

/// Integer coordinates of a cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterCoord {
    pub tile_x: u32,
    pub tile_y: u32,
    pub slice: u32,
}

/// Immutable geometric definition of the cluster grid.
#[derive(Clone, Debug)]
pub struct ClusterGrid {
    uniforms: ClusterGridUniforms,
    boundaries: Vec<f32>,
    projection: ClusterProjection,
}

impl ClusterGrid {
    /// Build a grid with the default projection (60° vertical FOV, near 0.1, far 200).
    pub fn initialize(
        viewport_width: u32,
        viewport_height: u32,
        tile_count_x: u32,
        tile_count_y: u32,
        depth_slice_boundaries: &[f32],
    ) -> ClusterResult<Self> {
        Self::initialize_with_projection(
            viewport_width,
            viewport_height,
            tile_count_x,
            tile_count_y,
            depth_slice_boundaries,
            ClusterProjection::default(),
        )
    }

    /// Build a grid, failing fast on any configuration error.
    pub fn initialize_with_projection(
        viewport_width: u32,
        viewport_height: u32,
        tile_count_x: u32,
        tile_count_y: u32,
        depth_slice_boundaries: &[f32],
        projection: ClusterProjection,
    ) -> ClusterResult<Self> {
        if tile_count_x == 0 || tile_count_y == 0 {
            return Err(ClusterError::InvalidTileCount {
                x: tile_count_x,
                y: tile_count_y,
            });
        }
        if viewport_width == 0 || viewport_height == 0 {
            return Err(ClusterError::ZeroViewport {
                width: viewport_width,
                height: viewport_height,
            });
        }
        if depth_slice_boundaries.len() > MAX_DEPTH_BOUNDARIES {
            return Err(ClusterError::TooManyDepthSlices {
                count: depth_slice_boundaries.len() + 1,
                max: MAX_DEPTH_SLICES,
            });
        }
        for (index, &value) in depth_slice_boundaries.iter().enumerate() {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ClusterError::NonPositiveBoundary { index, value });
            }
            if index > 0 {
                let previous = depth_slice_boundaries[index - 1];
                if value <= previous {
                    return Err(ClusterError::NonIncreasingBoundaries {
                        index,
                        previous,
                        value,
                    });
                }
            }
        }
        projection.validate(depth_slice_boundaries)?;

        let depth_slice_count = depth_slice_boundaries.len() as u32 + 1;
        let cell_count = tile_count_x
            .checked_mul(tile_count_y)
            .and_then(|n| n.checked_mul(depth_slice_count))
            .ok_or(ClusterError::TooManyClusters {
                x: tile_count_x,
                y: tile_count_y,
                slices: depth_slice_count,
            })?;
        let uniforms = ClusterGridUniforms {
            tile_count_x,
            tile_count_y,
            depth_slice_count,
            cell_count,
            viewport_width: viewport_width as f32,
            viewport_height: viewport_height as f32,
            tan_half_fov_y: (projection.fov_y * 0.5).tan(),
            aspect: viewport_width as f32 / viewport_height as f32,
            near: projection.near,
            far: projection.far,
            boundary_count: depth_slice_boundaries.len() as u32,
            _pad: 0,
            boundaries: ClusterGridUniforms::pack_boundaries(depth_slice_boundaries),
        };

        log::debug!(
            "[ClusterGrid] {}x{}x{} clusters for {}x{} viewport",
            tile_count_x,
            tile_count_y,
            depth_slice_count,
            viewport_width,
            viewport_height
        );

        Ok(Self {
            uniforms,
            boundaries: depth_slice_boundaries.to_vec(),
            projection,
        })
    }

    /// A fresh grid with the same tiles, boundaries and projection for a new viewport.
    pub fn rebuilt_for_viewport(&self, viewport_width: u32, viewport_height: u32) -> ClusterResult<Self> {
        Self::initialize_with_projection(
            viewport_width,
            viewport_height,
            self.uniforms.tile_count_x,
            self.uniforms.tile_count_y,
            &self.boundaries,
            self.projection,
        )
    }

    #[inline]
    pub fn tile_count_x(&self) -> u32 {
        self.uniforms.tile_count_x
    }

    #[inline]
    pub fn tile_count_y(&self) -> u32 {
        self.uniforms.tile_count_y
    }

    #[inline]
    pub fn depth_slice_count(&self) -> u32 {
        self.uniforms.depth_slice_count
    }

    #[inline]
    pub fn cell_count(&self) -> u32 {
        self.uniforms.cell_count
    }

    pub fn depth_slice_boundaries(&self) -> &[f32] {
        &self.boundaries
    }

    pub fn projection(&self) -> ClusterProjection {
        self.projection
    }

    /// The viewport extent this grid was built for.
    pub fn viewport(&self) -> (u32, u32) {
        (
            self.uniforms.viewport_width as u32,
            self.uniforms.viewport_height as u32,
        )
    }

    /// Whether the grid was built for this viewport. A `false` here means the
    /// caller owes a rebuild.
    pub fn matches_viewport(&self, viewport_width: u32, viewport_height: u32) -> bool {
        self.viewport() == (viewport_width, viewport_height)
    }

    /// The shared constant block uploaded for both culling and shading.
    pub fn uniforms(&self) -> &ClusterGridUniforms {
        &self.uniforms
    }

    /// Projection matrix for the grid's viewport aspect.
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.projection_matrix(self.uniforms.aspect)
    }

    /// Depth slice containing `view_depth`: the number of boundaries `<= view_depth`.
    pub fn depth_slice(&self, view_depth: f32) -> u32 {
        self.boundaries.partition_point(|b| *b <= view_depth) as u32
    }

    /// Tile containing a screen position, clamped to the grid.
    pub fn tile_coords(&self, screen_x: f32, screen_y: f32) -> (u32, u32) {
        let u = &self.uniforms;
        let tile_w = u.viewport_width / u.tile_count_x as f32;
        let tile_h = u.viewport_height / u.tile_count_y as f32;
        let tx = (screen_x / tile_w).floor().clamp(0.0, (u.tile_count_x - 1) as f32);
        let ty = (screen_y / tile_h).floor().clamp(0.0, (u.tile_count_y - 1) as f32);
        (tx as u32, ty as u32)
    }

    #[inline]
    pub fn linear_index(&self, tile_x: u32, tile_y: u32, slice: u32) -> u32 {
        slice * self.uniforms.tiles_per_slice() + tile_y * self.uniforms.tile_count_x + tile_x
    }

    /// Inverse of [`ClusterGrid::linear_index`].
    pub fn coords(&self, index: u32) -> ClusterCoord {
        let per_slice = self.uniforms.tiles_per_slice();
        let rem = index % per_slice;
        ClusterCoord {
            tile_x: rem % self.uniforms.tile_count_x,
            tile_y: rem / self.uniforms.tile_count_x,
            slice: index / per_slice,
        }
    }

    /// Cluster containing a fragment at `(screen_x, screen_y)` pixels and `view_depth`.
    pub fn cluster_index(&self, screen_x: f32, screen_y: f32, view_depth: f32) -> u32 {
        let (tile_x, tile_y) = self.tile_coords(screen_x, screen_y);
        self.linear_index(tile_x, tile_y, self.depth_slice(view_depth))
    }

    /// Near/far distances used for a slice's bounds. Slice 0 starts at the
    /// projection near plane and the open last slice ends at the far plane.
    pub fn slice_depth_range(&self, slice: u32) -> (f32, f32) {
        let u = &self.uniforms;
        let near = if slice == 0 { u.near } else { u.boundary(slice - 1) };
        let far = if slice >= u.boundary_count { u.far } else { u.boundary(slice) };
        (near, far)
    }

    /// View-space AABB of the frustum cell behind a cluster index.
    ///
    /// `index` must be below [`ClusterGrid::cell_count`].
    pub fn cluster_bounds(&self, index: u32) -> ClusterAabb {
        debug_assert!(index < self.cell_count(), "cluster {} out of range", index);
        let u = &self.uniforms;
        let c = self.coords(index);
        let tiles_x = u.tile_count_x as f32;
        let tiles_y = u.tile_count_y as f32;

        let ndc_min_x = -1.0 + 2.0 * c.tile_x as f32 / tiles_x;
        let ndc_max_x = -1.0 + 2.0 * (c.tile_x + 1) as f32 / tiles_x;
        // Screen rows grow downward, NDC y grows upward.
        let ndc_max_y = 1.0 - 2.0 * c.tile_y as f32 / tiles_y;
        let ndc_min_y = 1.0 - 2.0 * (c.tile_y + 1) as f32 / tiles_y;

        let tan_y = u.tan_half_fov_y;
        let tan_x = tan_y * u.aspect;
        let (near, far) = self.slice_depth_range(c.slice);

        let xs = [
            ndc_min_x * near * tan_x,
            ndc_max_x * near * tan_x,
            ndc_min_x * far * tan_x,
            ndc_max_x * far * tan_x,
        ];
        let ys = [
            ndc_min_y * near * tan_y,
            ndc_max_y * near * tan_y,
            ndc_min_y * far * tan_y,
            ndc_max_y * far * tan_y,
        ];

        ClusterAabb::new(
            Vec3::new(min4(xs), min4(ys), -far),
            Vec3::new(max4(xs), max4(ys), -near),
        )
    }

    /// Bounds for every cluster, indexed by linear index.
    pub fn all_cluster_bounds(&self) -> Vec<ClusterAabb> {
        (0..self.cell_count()).map(|i| self.cluster_bounds(i)).collect()
    }

    /// Pixel rectangle of the tile a cluster belongs to.
    pub fn cluster_screen_rect(&self, index: u32) -> ScreenRect {
        let u = &self.uniforms;
        let c = self.coords(index);
        let tile_w = u.viewport_width / u.tile_count_x as f32;
        let tile_h = u.viewport_height / u.tile_count_y as f32;
        ScreenRect {
            x0: c.tile_x as f32 * tile_w,
            y0: c.tile_y as f32 * tile_h,
            x1: (c.tile_x + 1) as f32 * tile_w,
            y1: (c.tile_y + 1) as f32 * tile_h,
        }
    }
}

#[inline]
fn min4(v: [f32; 4]) -> f32 {
    v[0].min(v[1]).min(v[2].min(v[3]))
}

#[inline]
fn max4(v: [f32; 4]) -> f32 {
    v[0].max(v[1]).max(v[2].max(v[3]))
}

// ============================================================================
// Tests
// ============================================================================

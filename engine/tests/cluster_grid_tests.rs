//! Cluster Grid Tests - Tiling, Bounds and Viewport Staleness
//!
//! Geometry properties of the grid that both the culling kernel and the
//! shading lookup depend on.

use cluster_forward_engine::render::cluster_grid::{ClusterGrid, ClusterProjection};
use glam::Vec3;

fn scenario_grid() -> ClusterGrid {
    ClusterGrid::initialize(1920, 1080, 16, 9, &[5.0, 20.0, 50.0]).unwrap()
}

// ============================================================================
// Tiling
// ============================================================================

#[test]
fn test_tiles_cover_viewport_without_gaps_or_overlaps() {
    // 1000 / 7 and 700 / 6 do not divide evenly, so edges land on fractions.
    let grid = ClusterGrid::initialize(1000, 700, 7, 6, &[3.0, 30.0]).unwrap();
    for slice in 0..grid.depth_slice_count() - 1 {
        let rects: Vec<_> = (0..grid.tile_count_x() * grid.tile_count_y())
            .map(|t| grid.cluster_screen_rect(grid.linear_index(t % 7, t / 7, slice)))
            .collect();

        let area: f32 = rects.iter().map(|r| r.area()).sum();
        assert!((area - 1000.0 * 700.0).abs() < 1.0, "slice {} covers {}", slice, area);

        for (i, a) in rects.iter().enumerate() {
            assert!(a.x0 >= 0.0 && a.y0 >= 0.0 && a.x1 <= 1000.01 && a.y1 <= 700.01);
            for b in &rects[i + 1..] {
                assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
            }
        }
    }
}

#[test]
fn test_pixel_centers_map_back_to_their_tile() {
    let grid = scenario_grid();
    for slice in 0..grid.depth_slice_count() {
        let (near, far) = grid.slice_depth_range(slice);
        let depth = (near + far) * 0.5;
        for tile in 0..grid.tile_count_x() * grid.tile_count_y() {
            let index = slice * 144 + tile;
            let rect = grid.cluster_screen_rect(index);
            let cx = (rect.x0 + rect.x1) * 0.5;
            let cy = (rect.y0 + rect.y1) * 0.5;
            assert_eq!(grid.cluster_index(cx, cy, depth), index);
        }
    }
}

#[test]
fn test_bounds_enclose_projected_tile_corners() {
    let grid = scenario_grid();
    let projection = grid.projection();
    let tan_y = (projection.fov_y * 0.5).tan();
    let tan_x = tan_y * 1920.0 / 1080.0;

    for index in 0..grid.cell_count() {
        let c = grid.coords(index);
        let rect = grid.cluster_screen_rect(index);
        let bounds = grid.cluster_bounds(index);
        let (near, far) = grid.slice_depth_range(c.slice);

        for (sx, sy) in [(rect.x0, rect.y0), (rect.x1, rect.y0), (rect.x0, rect.y1), (rect.x1, rect.y1)] {
            let ndc_x = sx / 1920.0 * 2.0 - 1.0;
            let ndc_y = 1.0 - sy / 1080.0 * 2.0;
            for d in [near, far] {
                let p = Vec3::new(ndc_x * d * tan_x, ndc_y * d * tan_y, -d);
                let eps = Vec3::splat(1e-3);
                assert!(
                    p.cmpge(bounds.min - eps).all() && p.cmple(bounds.max + eps).all(),
                    "corner {:?} outside cluster {} bounds {:?}",
                    p,
                    index,
                    bounds
                );
            }
        }
    }
}

#[test]
fn test_top_row_is_positive_y() {
    let grid = scenario_grid();
    let top = grid.cluster_bounds(grid.linear_index(8, 0, 1));
    let bottom = grid.cluster_bounds(grid.linear_index(8, 8, 1));
    assert!(top.min.y > 0.0);
    assert!(bottom.max.y < 0.0);
}

#[test]
fn test_custom_projection_changes_bounds() {
    let narrow = ClusterGrid::initialize_with_projection(
        1920,
        1080,
        16,
        9,
        &[5.0, 20.0, 50.0],
        ClusterProjection::new(30f32.to_radians(), 0.5, 100.0),
    )
    .unwrap();
    let wide = scenario_grid();
    let index = narrow.linear_index(15, 4, 2);
    assert!(narrow.cluster_bounds(index).max.x < wide.cluster_bounds(index).max.x);
    assert_eq!(narrow.slice_depth_range(0).0, 0.5);
    assert_eq!(narrow.slice_depth_range(3).1, 100.0);
}

// ============================================================================
// Viewport staleness
// ============================================================================

#[test]
fn test_stale_grid_keeps_old_tiles() {
    let grid = scenario_grid();
    assert!(!grid.matches_viewport(1280, 720));

    // Bottom-right pixel of a 1280x720 viewport. The stale grid still divides
    // by 120 px tiles and lands mid-screen instead of in the last tile.
    let stale = grid.cluster_index(1279.0, 719.0, 1.0);
    let c = grid.coords(stale);
    assert_eq!((c.tile_x, c.tile_y, c.slice), (10, 5, 0));

    let rebuilt = grid.rebuilt_for_viewport(1280, 720).unwrap();
    let fresh = rebuilt.coords(rebuilt.cluster_index(1279.0, 719.0, 1.0));
    assert_eq!((fresh.tile_x, fresh.tile_y, fresh.slice), (15, 8, 0));
}

#[test]
fn test_stale_grid_is_not_patched() {
    let grid = scenario_grid();
    let before = grid.cluster_index(640.0, 360.0, 10.0);
    let _ = grid.matches_viewport(1280, 720);
    assert_eq!(grid.viewport(), (1920, 1080));
    assert_eq!(grid.cluster_index(640.0, 360.0, 10.0), before);
}

// ============================================================================
// Shared constants
// ============================================================================

#[test]
fn test_uniforms_describe_the_grid() {
    let grid = scenario_grid();
    let u = grid.uniforms();
    assert_eq!((u.tile_count_x, u.tile_count_y, u.depth_slice_count), (16, 9, 4));
    assert_eq!(u.cell_count, 576);
    assert_eq!(u.boundary_count, 3);
    assert_eq!(u.boundaries[0], [5.0, 20.0, 50.0, 0.0]);
    assert_eq!((u.viewport_width, u.viewport_height), (1920.0, 1080.0));
    assert!((u.tan_half_fov_y - 30f32.to_radians().tan()).abs() < 1e-6);
}

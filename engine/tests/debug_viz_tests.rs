//! Debug Visualization Tests - Heat-map and Marker Output

use cluster_forward_engine::render::cluster_grid::ClusterGrid;
use cluster_forward_engine::render::cluster_layout::TileEntry;
use cluster_forward_engine::render::cluster_lists::ClusterLightLists;
use cluster_forward_engine::render::debug_viz;
use cluster_forward_engine::render::light_culling_cpu::cull_lights_cpu;
use cluster_forward_engine::render::light_population::{Light, LightPopulation, LightBounds};
use glam::{Mat4, Vec3};
use image::Rgba;

fn small_grid() -> ClusterGrid {
    ClusterGrid::initialize(400, 200, 4, 2, &[10.0]).unwrap()
}

/// Counts set directly: cluster index -> count, capacity 8.
fn lists_with_counts(grid: &ClusterGrid, counts: &[(u32, u32)]) -> ClusterLightLists {
    let mut tiles: Vec<TileEntry> = (0..grid.cell_count()).map(|c| TileEntry::new(0, c * 8)).collect();
    for &(cluster, count) in counts {
        tiles[cluster as usize].count = count;
    }
    ClusterLightLists::from_parts(tiles, vec![0; (grid.cell_count() * 8) as usize], 8)
}

#[test]
fn test_flatten_sums_depth_slices() {
    let grid = small_grid();
    let lists = lists_with_counts(
        &grid,
        &[
            (grid.linear_index(1, 0, 0), 2),
            (grid.linear_index(1, 0, 1), 3),
            (grid.linear_index(3, 1, 1), 5),
        ],
    );
    let flat = debug_viz::flatten_counts(&grid, &lists);
    assert_eq!(flat, vec![0, 5, 0, 0, 0, 0, 0, 5]);
}

#[test]
fn test_heatmap_has_one_pixel_per_tile() {
    let grid = small_grid();
    let lists = lists_with_counts(&grid, &[(grid.linear_index(2, 1, 0), 4), (grid.linear_index(0, 0, 1), 2)]);
    let heatmap = debug_viz::cluster_heatmap(&grid, &lists);

    assert_eq!(heatmap.dimensions(), (4, 2));
    // Busiest tile is full red, empty tiles black.
    assert_eq!(*heatmap.get_pixel(2, 1), Rgba([255, 0, 0, 255]));
    assert_eq!(*heatmap.get_pixel(3, 0), Rgba([0, 0, 0, 255]));
    assert_eq!(*heatmap.get_pixel(0, 0), debug_viz::heat_color(0.5));

    let scaled = debug_viz::heatmap_scaled(&heatmap, 64, 32);
    assert_eq!(scaled.dimensions(), (64, 32));
    assert_eq!(*scaled.get_pixel(40, 20), Rgba([255, 0, 0, 255]));
}

#[test]
fn test_markers_follow_projection() {
    let grid = small_grid();
    let view_proj = grid.projection_matrix() * Mat4::IDENTITY;
    let lights = [
        Light::at(Vec3::new(0.0, 0.0, -10.0)).with_color(Vec3::new(0.0, 1.0, 0.0)),
        // Behind the camera: not drawn.
        Light::at(Vec3::new(0.0, 0.0, 10.0)),
    ];
    let image = debug_viz::render_light_markers(&lights, view_proj, 400, 200);

    assert_eq!(*image.get_pixel(200, 100), Rgba([0, 255, 0, 255]));
    let lit = image.pixels().filter(|p| p.0 != [0, 0, 0, 255]).count();
    let side = (2 * debug_viz::MARKER_RADIUS + 1) as usize;
    assert_eq!(lit, side * side);
}

#[test]
fn test_heatmap_from_culled_population_saves_png() {
    let grid = ClusterGrid::initialize(1920, 1080, 16, 9, &[5.0, 20.0, 50.0]).unwrap();
    let population = LightPopulation::generate(128, LightBounds::default(), 42);
    let out = cull_lights_cpu(&grid, &population.to_gpu(128), Mat4::IDENTITY, 64, 4.0);

    let flat = debug_viz::flatten_counts(&grid, &out.lists);
    assert_eq!(flat.iter().map(|&n| n as u64).sum::<u64>(), out.lists.total_assignments());

    let heatmap = debug_viz::cluster_heatmap(&grid, &out.lists);
    let path = std::env::temp_dir().join(format!("cluster_heatmap_test_{}.png", std::process::id()));
    debug_viz::save_png(&heatmap, &path).unwrap();

    let reloaded = image::open(&path).unwrap().to_rgba8();
    assert_eq!(reloaded.dimensions(), (16, 9));
    assert_eq!(reloaded, heatmap);
    let _ = std::fs::remove_file(&path);
}

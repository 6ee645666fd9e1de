//! Debug Visualization
//!
//! Off-critical-path diagnostics rendered on the CPU:
//! - light markers: world positions projected through the view-projection matrix
//! - cluster heat-map: per-tile light counts summed over all depth slices
//!
//! Inputs come from `ClusterLightLists`, which on the GPU path means a
//! blocking readback. Invoke on demand only.

use std::path::Path;

use glam::{Mat4, Vec4};
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

use super::cluster_grid::ClusterGrid;
use super::cluster_lists::ClusterLightLists;
use super::light_population::Light;
use crate::error::ClusterResult;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Half-width of a light marker in pixels.
pub const MARKER_RADIUS: i32 = 2;

/// Project a world position to pixel coordinates (origin top-left).
/// `None` when the point is behind the camera or outside the view volume.
pub fn project_to_screen(view_proj: Mat4, position: glam::Vec3, width: u32, height: u32) -> Option<(f32, f32)> {
    let clip = view_proj * position.extend(1.0);
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || ndc.z < 0.0 || ndc.z > 1.0 {
        return None;
    }
    let x = (ndc.x * 0.5 + 0.5) * width as f32;
    let y = (0.5 - ndc.y * 0.5) * height as f32;
    Some((x, y))
}

/// Rasterize one square marker per visible light, in the light's color.
pub fn render_light_markers(lights: &[Light], view_proj: Mat4, width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, BACKGROUND);
    for light in lights {
        let Some((x, y)) = project_to_screen(view_proj, light.position, width, height) else {
            continue;
        };
        let color = to_rgba8(light.color_intensity);
        let (cx, cy) = (x as i32, y as i32);
        for py in (cy - MARKER_RADIUS)..=(cy + MARKER_RADIUS) {
            for px in (cx - MARKER_RADIUS)..=(cx + MARKER_RADIUS) {
                if px >= 0 && py >= 0 && (px as u32) < width && (py as u32) < height {
                    image.put_pixel(px as u32, py as u32, color);
                }
            }
        }
    }
    image
}

fn to_rgba8(color_intensity: Vec4) -> Rgba<u8> {
    let rgb = color_intensity.truncate().clamp(glam::Vec3::ZERO, glam::Vec3::ONE) * 255.0;
    Rgba([rgb.x as u8, rgb.y as u8, rgb.z as u8, 255])
}

/// Per-tile counts summed over every depth slice, row-major (`tile_y * tiles_x + tile_x`).
pub fn flatten_counts(grid: &ClusterGrid, lists: &ClusterLightLists) -> Vec<u32> {
    let tiles_x = grid.tile_count_x();
    let per_slice = (tiles_x * grid.tile_count_y()) as usize;
    let mut flat = vec![0u32; per_slice];
    for cluster in 0..grid.cell_count().min(lists.cell_count() as u32) {
        let c = grid.coords(cluster);
        flat[(c.tile_y * tiles_x + c.tile_x) as usize] += lists.count(cluster);
    }
    flat
}

/// Black → blue → green → yellow → red ramp for `t` in `[0, 1]`.
pub fn heat_color(t: f32) -> Rgba<u8> {
    const STOPS: [[f32; 3]; 5] = [
        [0.0, 0.0, 0.0],
        [0.0, 0.0, 1.0],
        [0.0, 1.0, 0.0],
        [1.0, 1.0, 0.0],
        [1.0, 0.0, 0.0],
    ];
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let scaled = t * (STOPS.len() - 1) as f32;
    let i = (scaled.floor() as usize).min(STOPS.len() - 2);
    let f = scaled - i as f32;
    let (a, b) = (STOPS[i], STOPS[i + 1]);
    let mix = |k: usize| ((a[k] + (b[k] - a[k]) * f) * 255.0).round() as u8;
    Rgba([mix(0), mix(1), mix(2), 255])
}

/// One pixel per tile, colored by density relative to the busiest tile.
pub fn cluster_heatmap(grid: &ClusterGrid, lists: &ClusterLightLists) -> RgbaImage {
    let flat = flatten_counts(grid, lists);
    let peak = flat.iter().copied().max().unwrap_or(0).max(1) as f32;
    let tiles_x = grid.tile_count_x();
    RgbaImage::from_fn(tiles_x, grid.tile_count_y(), |x, y| {
        heat_color(flat[(y * tiles_x + x) as usize] as f32 / peak)
    })
}

/// Blow the per-tile heat-map up to a viewable size without smoothing tile edges.
pub fn heatmap_scaled(heatmap: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    image::imageops::resize(heatmap, width, height, FilterType::Nearest)
}

pub fn save_png(image: &RgbaImage, path: impl AsRef<Path>) -> ClusterResult<()> {
    image.save_with_format(path.as_ref(), image::ImageFormat::Png)?;
    log::info!("[DebugViz] wrote {}", path.as_ref().display());
    Ok(())
}

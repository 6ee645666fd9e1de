//! GPU Culling Tests - Compute Kernel Against the CPU Reference
//!
//! These need an adapter with compute support. On machines without one
//! (headless CI without a software rasterizer) each test logs and returns.

use std::collections::BTreeSet;

use cluster_forward_engine::render::cluster_grid::ClusterGrid;
use cluster_forward_engine::render::cluster_layout::GpuLight;
use cluster_forward_engine::render::frame_sync::SyncStrategyKind;
use cluster_forward_engine::render::light_culling_cpu::cull_lights_cpu;
use cluster_forward_engine::render::light_population::{generate_lights, LightBounds};
use cluster_forward_engine::{ClusterConfig, ClusterError, ClusterLightLists, ClusteredLighting, CullStats, GpuContext, GpuContextConfig};
use glam::{Mat4, Vec3, Vec4};

fn gpu() -> Option<GpuContext> {
    match GpuContext::new_headless(&GpuContextConfig::default()) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {}", e);
            None
        }
    }
}

fn config(max_per_cluster: u32, radius: f32) -> ClusterConfig {
    ClusterConfig {
        max_lights_per_cluster: max_per_cluster,
        light_radius: radius,
        ..ClusterConfig::default()
    }
}

/// Cull one frame and read the results back.
fn run_frame(
    gpu: &GpuContext,
    lighting: &mut ClusteredLighting,
    lights: &[GpuLight],
) -> (usize, ClusterLightLists, CullStats) {
    lighting.upload_lights(&gpu.queue, lights).unwrap();
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("test_frame") });
    let set = lighting.record_culling(&mut encoder, &gpu.queue, Mat4::IDENTITY).unwrap();
    gpu.submit_and_wait(encoder).unwrap();
    lighting.begin_shading().unwrap();
    lighting.end_shading().unwrap();

    let lists = lighting.read_back_lists(&gpu.device, &gpu.queue).unwrap();
    let stats = lighting.read_stats(&gpu.device, &gpu.queue).unwrap();
    (set, lists, stats)
}

/// A point only cluster `target` covers, and a radius that keeps the sphere
/// away from every other cluster.
fn exclusive_light(grid: &ClusterGrid, target: u32) -> (Vec3, f32) {
    let bounds = grid.all_cluster_bounds();
    let c = grid.coords(target);
    let own = bounds[target as usize];
    let right = bounds[grid.linear_index(c.tile_x + 1, c.tile_y, c.slice) as usize];
    let (near, far) = grid.slice_depth_range(c.slice);
    let p = Vec3::new(
        (own.min.x + right.min.x) * 0.5,
        (own.min.y + own.max.y) * 0.5,
        -(near + far) * 0.5,
    );
    let margin = bounds
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as u32 != target)
        .map(|(_, b)| (p - p.clamp(b.min, b.max)).length())
        .fold(f32::INFINITY, f32::min);
    (p, margin * 0.25)
}

#[test]
fn test_gpu_empty_population() {
    let Some(gpu) = gpu() else { return };
    let mut lighting = ClusteredLighting::new(&gpu.device, &gpu.queue, &config(64, 4.0), 1920, 1080).unwrap();
    let (_, lists, stats) = run_frame(&gpu, &mut lighting, &[]);

    assert_eq!(lists.cell_count(), 576);
    assert_eq!(lists.total_assignments(), 0);
    assert_eq!(stats.saturated_clusters, 0);
}

#[test]
fn test_gpu_single_light_lands_in_one_cluster() {
    let Some(gpu) = gpu() else { return };
    let mut lighting = ClusteredLighting::new(&gpu.device, &gpu.queue, &config(64, 1.0), 1920, 1080).unwrap();
    let target = lighting.grid().linear_index(8, 4, 0);
    let (position, radius) = exclusive_light(lighting.grid(), target);
    lighting.set_light_radius(radius);

    let (_, lists, _) = run_frame(&gpu, &mut lighting, &[GpuLight::new(position, Vec4::ONE)]);

    assert_eq!(lists.lights(target), &[0]);
    assert_eq!(lists.tile(target).offset, target * 64);
    assert_eq!(lists.total_assignments(), 1);
}

#[test]
fn test_gpu_saturation_reports_stats() {
    let Some(gpu) = gpu() else { return };
    let mut lighting = ClusteredLighting::new(&gpu.device, &gpu.queue, &config(4, 1.0), 1920, 1080).unwrap();
    let target = lighting.grid().linear_index(8, 4, 0);
    let (position, radius) = exclusive_light(lighting.grid(), target);
    lighting.set_light_radius(radius);
    let lights = vec![GpuLight::new(position, Vec4::ONE); 10];

    let (_, lists, stats) = run_frame(&gpu, &mut lighting, &lights);

    assert_eq!(lists.count(target), 4);
    let unique: BTreeSet<u32> = lists.lights(target).iter().copied().collect();
    assert_eq!(unique.len(), 4);
    assert!(unique.iter().all(|&i| i < 10));
    assert_eq!(stats.saturated_clusters, 1);
    assert_eq!(stats.dropped_lights, 6);
}

#[test]
fn test_gpu_matches_cpu_reference() {
    let Some(gpu) = gpu() else { return };
    let radius = 4.0;
    let mut lighting = ClusteredLighting::new(&gpu.device, &gpu.queue, &config(256, radius), 1920, 1080).unwrap();
    let lights: Vec<GpuLight> = generate_lights(200, LightBounds::default(), 9)
        .iter()
        .map(|l| l.to_gpu())
        .collect();

    let (_, lists, stats) = run_frame(&gpu, &mut lighting, &lights);
    assert_eq!(stats.dropped_lights, 0);

    // Device and host round differently; only borderline lights may disagree.
    let grid = lighting.grid();
    let inner = cull_lights_cpu(grid, &lights, Mat4::IDENTITY, 256, radius * 0.999);
    let outer = cull_lights_cpu(grid, &lights, Mat4::IDENTITY, 256, radius * 1.001);
    for c in 0..grid.cell_count() {
        let actual: BTreeSet<u32> = lists.lights(c).iter().copied().collect();
        let lower: BTreeSet<u32> = inner.lists.lights(c).iter().copied().collect();
        let upper: BTreeSet<u32> = outer.lists.lights(c).iter().copied().collect();
        assert!(lower.is_subset(&actual), "cluster {} missed lights", c);
        assert!(actual.is_subset(&upper), "cluster {} has extra lights", c);
    }
}

#[test]
fn test_gpu_double_buffering_alternates_sets() {
    let Some(gpu) = gpu() else { return };
    let cfg = ClusterConfig {
        sync_strategy: SyncStrategyKind::DoubleBuffered,
        ..config(64, 1.0)
    };
    let mut lighting = ClusteredLighting::new(&gpu.device, &gpu.queue, &cfg, 1920, 1080).unwrap();
    assert_eq!(lighting.buffers().set_count(), 2);

    let target = lighting.grid().linear_index(8, 4, 0);
    let (position, radius) = exclusive_light(lighting.grid(), target);
    lighting.set_light_radius(radius);
    let light = GpuLight::new(position, Vec4::ONE);

    let (first, lists_a, _) = run_frame(&gpu, &mut lighting, &[light]);
    let (second, lists_b, _) = run_frame(&gpu, &mut lighting, &[light, light]);
    assert_eq!((first, second), (0, 1));
    assert_eq!(lists_a.count(target), 1);
    assert_eq!(lists_b.count(target), 2);

    // Frame 0's set still holds frame 0's result.
    let old = lighting.buffers().read_back_lists(&gpu.device, &gpu.queue, 0).unwrap();
    assert_eq!(old.count(target), 1);
}

#[test]
fn test_gpu_oversized_grid_is_an_error() {
    let Some(gpu) = gpu() else { return };
    let cfg = ClusterConfig {
        tile_count_x: 64,
        tile_count_y: 36,
        depth_slice_boundaries: (1..=31).map(|i| i as f32 * 5.0).collect(),
        max_lights_per_cluster: 1024,
        ..ClusterConfig::default()
    };
    match ClusteredLighting::new(&gpu.device, &gpu.queue, &cfg, 1920, 1080) {
        Err(ClusterError::BufferTooLarge { name, .. }) => assert_eq!(name, "light_index_buffer"),
        Err(e) => panic!("expected BufferTooLarge, got {}", e),
        Ok(_) => panic!("oversized grid was accepted"),
    }
}

#[test]
fn test_gpu_resize_rebuilds_on_request() {
    let Some(gpu) = gpu() else { return };
    let mut lighting = ClusteredLighting::new(&gpu.device, &gpu.queue, &config(64, 4.0), 1920, 1080).unwrap();

    lighting.resize(1280, 720);
    assert!(lighting.is_dirty());
    assert_eq!(lighting.grid().viewport(), (1920, 1080));

    assert!(lighting.rebuild_if_dirty(&gpu.device, &gpu.queue).unwrap());
    assert_eq!(lighting.grid().viewport(), (1280, 720));
    assert!(!lighting.rebuild_if_dirty(&gpu.device, &gpu.queue).unwrap());

    let (set, lists, _) = run_frame(&gpu, &mut lighting, &[GpuLight::new(Vec3::new(0.0, 0.0, -10.0), Vec4::ONE)]);
    assert_eq!(set, 0);
    assert!(lists.non_empty_clusters() > 0);
}

//! Cluster Heat-map
//!
//! Headless diagnostic: generates (and optionally animates) a light
//! population, culls it against the cluster grid on the GPU or the CPU, and
//! writes a per-tile density heat-map plus a projected light-marker image.
//!
//! Usage:
//!   cargo run --bin cluster-heatmap -- --config cluster.json --frames 120
//!   cargo run --bin cluster-heatmap -- --cpu --out-dir target/heatmap

use std::path::PathBuf;

use clap::Parser;
use glam::Mat4;

use cluster_forward_engine::render::debug_viz;
use cluster_forward_engine::{
    ClusterConfig, ClusterLightLists, ClusterResult, ClusteredLighting, CpuLightCuller, CullStats, GpuContext,
    GpuContextConfig, LightPopulation,
};

/// Longest heat-map edge written, in pixels.
const MAX_HEATMAP_SIDE: u32 = 16_384;

#[derive(Debug, Parser)]
#[command(name = "cluster-heatmap", version, about = "Clustered light culling heat-map")]
struct Cli {
    #[arg(long, help = "JSON cluster config (defaults are used if omitted)")]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = 1920, help = "Viewport width in pixels")]
    width: u32,
    #[arg(long, default_value_t = 1080, help = "Viewport height in pixels")]
    height: u32,
    #[arg(long, value_name = "N", default_value_t = 60, help = "Animation frames to simulate before capture")]
    frames: u32,
    #[arg(long, default_value_t = 1.0 / 60.0, help = "Seconds per simulated frame")]
    dt: f32,
    #[arg(long, help = "Cull on the CPU instead of the GPU")]
    cpu: bool,
    #[arg(long, default_value = "heatmap_out", help = "Directory for heatmap.png and lights.png")]
    out_dir: PathBuf,
    #[arg(
        long,
        value_name = "PX",
        default_value_t = 32,
        value_parser = clap::value_parser!(u32).range(1..=256),
        help = "Heat-map pixels per tile"
    )]
    tile_pixels: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        log::error!("cluster-heatmap failed: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> ClusterResult<()> {
    let config = match &cli.config {
        Some(path) => ClusterConfig::load(path)?,
        None => ClusterConfig::default(),
    };
    let grid = config.build_grid(cli.width, cli.height)?;
    let mut population = config.build_population();
    // Camera at the origin looking down -Z; the default bounds sit in front of it.
    let view = Mat4::IDENTITY;

    let (lists, stats) = if cli.cpu {
        cull_on_cpu(cli, &config, &grid, &mut population, view)
    } else {
        match GpuContext::new_headless(&GpuContextConfig::default()) {
            Ok(gpu) => cull_on_gpu(cli, &config, &gpu, &mut population, view)?,
            Err(e) => {
                log::warn!("{}, falling back to CPU culling", e);
                cull_on_cpu(cli, &config, &grid, &mut population, view)
            }
        }
    };

    log::info!(
        "{} lights, {} assignments, {} non-empty clusters, busiest {} / {}, {} saturated ({} dropped)",
        population.len(),
        lists.total_assignments(),
        lists.non_empty_clusters(),
        lists.max_count(),
        lists.max_lights_per_cluster(),
        stats.saturated_clusters,
        stats.dropped_lights
    );

    std::fs::create_dir_all(&cli.out_dir)?;
    let heatmap = debug_viz::cluster_heatmap(&grid, &lists);
    let (width, height) = heatmap_extent(&grid, cli.tile_pixels);
    let heatmap = debug_viz::heatmap_scaled(&heatmap, width, height);
    debug_viz::save_png(&heatmap, cli.out_dir.join("heatmap.png"))?;

    let view_proj = grid.projection_matrix() * view;
    let markers = debug_viz::render_light_markers(population.lights(), view_proj, cli.width, cli.height);
    debug_viz::save_png(&markers, cli.out_dir.join("lights.png"))?;
    Ok(())
}

/// Output size of the scaled heat-map, clamped to what `image` can allocate.
fn heatmap_extent(grid: &cluster_forward_engine::ClusterGrid, tile_pixels: u32) -> (u32, u32) {
    let scale = tile_pixels.max(1);
    (
        grid.tile_count_x().saturating_mul(scale).min(MAX_HEATMAP_SIDE),
        grid.tile_count_y().saturating_mul(scale).min(MAX_HEATMAP_SIDE),
    )
}

fn cull_on_cpu(
    cli: &Cli,
    config: &ClusterConfig,
    grid: &cluster_forward_engine::ClusterGrid,
    population: &mut LightPopulation,
    view: Mat4,
) -> (ClusterLightLists, CullStats) {
    let culler = CpuLightCuller::new(grid, config.max_lights_per_cluster);
    let max_lights = config.max_lights as usize;
    let mut output = culler.cull(&population.to_gpu(max_lights), view, config.light_radius);
    for _ in 0..cli.frames {
        population.step(cli.dt);
        output = culler.cull(&population.to_gpu(max_lights), view, config.light_radius);
    }
    (output.lists, output.stats)
}

fn cull_on_gpu(
    cli: &Cli,
    config: &ClusterConfig,
    gpu: &GpuContext,
    population: &mut LightPopulation,
    view: Mat4,
) -> ClusterResult<(ClusterLightLists, CullStats)> {
    let mut lighting = ClusteredLighting::new(&gpu.device, &gpu.queue, config, cli.width, cli.height)?;
    let max_lights = config.max_lights as usize;

    for frame in 0..=cli.frames {
        if frame > 0 {
            population.step(cli.dt);
        }
        lighting.upload_lights(&gpu.queue, &population.to_gpu(max_lights))?;

        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("cluster_heatmap_frame"),
        });
        lighting.record_culling(&mut encoder, &gpu.queue, view)?;
        gpu.queue.submit(std::iter::once(encoder.finish()));

        // No forward pass here; the shading phase only advances the sync policy.
        lighting.begin_shading()?;
        lighting.end_shading()?;
    }

    let lists = lighting.read_back_lists(&gpu.device, &gpu.queue)?;
    let stats = lighting.read_stats(&gpu.device, &gpu.queue)?;
    Ok((lists, stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heatmap_extent_scales_tiles() {
        let grid = cluster_forward_engine::ClusterGrid::initialize(1920, 1080, 16, 9, &[5.0]).unwrap();
        assert_eq!(heatmap_extent(&grid, 32), (512, 288));
        assert_eq!(heatmap_extent(&grid, 0), (16, 9));
    }

    #[test]
    fn test_heatmap_extent_clamps_huge_grids() {
        let grid = cluster_forward_engine::ClusterGrid::initialize(1920, 1080, 65_535, 2, &[]).unwrap();
        assert_eq!(heatmap_extent(&grid, 256), (MAX_HEATMAP_SIDE, 512));
        assert_eq!(heatmap_extent(&grid, u32::MAX), (MAX_HEATMAP_SIDE, MAX_HEATMAP_SIDE));
    }

    #[test]
    fn test_tile_pixels_range_is_enforced() {
        assert!(Cli::try_parse_from(["cluster-heatmap", "--tile-pixels", "0"]).is_err());
        assert!(Cli::try_parse_from(["cluster-heatmap", "--tile-pixels", "257"]).is_err());
        let cli = Cli::try_parse_from(["cluster-heatmap", "--tile-pixels", "8"]).unwrap();
        assert_eq!(cli.tile_pixels, 8);
    }
}

//! Culling Tests - Light Assignment Properties
//!
//! Runs the CPU culler, which shares its output contract with the GPU kernel,
//! against the grid's own `cluster_bounds` as the oracle.

use std::collections::BTreeSet;

use cluster_forward_engine::render::cluster_grid::ClusterGrid;
use cluster_forward_engine::render::cluster_layout::GpuLight;
use cluster_forward_engine::render::light_culling_cpu::{cull_lights_cpu, view_space_position, CpuLightCuller};
use cluster_forward_engine::render::light_population::{generate_lights, LightBounds};
use glam::{Mat4, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

fn scenario_grid() -> ClusterGrid {
    ClusterGrid::initialize(1920, 1080, 16, 9, &[5.0, 20.0, 50.0]).unwrap()
}

fn to_gpu(positions: &[Vec3]) -> Vec<GpuLight> {
    positions.iter().map(|p| GpuLight::new(*p, Vec4::ONE)).collect()
}

/// A point inside `target` that is not inside any other cluster's bounds, and
/// a radius small enough that a sphere there touches `target` only.
///
/// Slice-0 bounds all reach back to the near plane, so neighbouring AABBs
/// overlap heavily. The point sits between the target's left edge and the
/// next tile's left edge, which only the target covers.
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
    assert!(own.contains_point(p));

    let margin = bounds
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as u32 != target)
        .map(|(_, b)| (p - p.clamp(b.min, b.max)).length())
        .fold(f32::INFINITY, f32::min);
    assert!(margin > 0.0, "point is shared with another cluster");
    (p, margin * 0.25)
}

fn brute_force_sets(grid: &ClusterGrid, lights: &[GpuLight], view: Mat4, radius: f32) -> Vec<BTreeSet<u32>> {
    (0..grid.cell_count())
        .map(|c| {
            let bounds = grid.cluster_bounds(c);
            lights
                .iter()
                .enumerate()
                .filter(|(_, l)| bounds.intersects_sphere(view_space_position(view, l), radius))
                .map(|(i, _)| i as u32)
                .collect()
        })
        .collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_empty() {
    let grid = scenario_grid();
    let out = cull_lights_cpu(&grid, &[], Mat4::IDENTITY, 64, 4.0);
    assert_eq!(out.lists.cell_count(), 576);
    assert!(out.lists.counts().iter().all(|&n| n == 0));
}

#[test]
fn test_scenario_single_light_nearest_center_cluster() {
    let grid = scenario_grid();
    let target = grid.linear_index(8, 4, 0);
    let (position, radius) = exclusive_light(&grid, target);

    let out = cull_lights_cpu(&grid, &to_gpu(&[position]), Mat4::IDENTITY, 64, radius);

    assert_eq!(out.lists.count(target), 1);
    assert_eq!(out.lists.lights(target), &[0]);
    assert_eq!(out.lists.tile(target).offset, target * 64);
    for c in (0..grid.cell_count()).filter(|&c| c != target) {
        assert_eq!(out.lists.count(c), 0, "cluster {} should be empty", c);
    }
}

#[test]
fn test_scenario_saturation() {
    let grid = scenario_grid();
    let target = grid.linear_index(8, 4, 0);
    let (position, radius) = exclusive_light(&grid, target);
    let lights = to_gpu(&vec![position; 10]);

    let out = cull_lights_cpu(&grid, &lights, Mat4::IDENTITY, 4, radius);

    assert_eq!(out.lists.count(target), 4);
    let indices = out.lists.sorted_lights(target);
    let unique: BTreeSet<u32> = indices.iter().copied().collect();
    assert_eq!(unique.len(), 4, "duplicate index in {:?}", indices);
    assert!(indices.iter().all(|&i| i < 10));
    assert_eq!(out.stats.saturated_clusters, 1);
    assert_eq!(out.stats.dropped_lights, 6);
    assert_eq!(out.lists.total_assignments(), 4);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_membership_iff_sphere_intersects_bounds() {
    let grid = scenario_grid();
    let lights = to_gpu(
        &generate_lights(300, LightBounds::default(), 11)
            .iter()
            .map(|l| l.position)
            .collect::<Vec<_>>(),
    );
    let view = Mat4::look_at_rh(Vec3::new(3.0, 2.0, 5.0), Vec3::new(0.0, 0.0, -50.0), Vec3::Y);

    // Capacity above the light count: nothing may be dropped.
    let out = cull_lights_cpu(&grid, &lights, view, 512, 4.0);
    let expected = brute_force_sets(&grid, &lights, view, 4.0);

    assert_eq!(out.stats.dropped_lights, 0);
    for c in 0..grid.cell_count() {
        let actual: BTreeSet<u32> = out.lists.lights(c).iter().copied().collect();
        assert_eq!(actual, expected[c as usize], "cluster {}", c);
    }
}

#[test]
fn test_sets_are_order_independent() {
    let grid = scenario_grid();
    let positions: Vec<Vec3> = generate_lights(200, LightBounds::default(), 21)
        .iter()
        .map(|l| l.position)
        .collect();
    let culler = CpuLightCuller::new(&grid, 256);
    let first = culler.cull(&to_gpu(&positions), Mat4::IDENTITY, 4.0);
    let again = culler.cull(&to_gpu(&positions), Mat4::IDENTITY, 4.0);

    let mut permutation: Vec<usize> = (0..positions.len()).collect();
    permutation.shuffle(&mut StdRng::seed_from_u64(5));
    let shuffled: Vec<Vec3> = permutation.iter().map(|&i| positions[i]).collect();
    let permuted = culler.cull(&to_gpu(&shuffled), Mat4::IDENTITY, 4.0);

    for c in 0..grid.cell_count() {
        assert_eq!(first.lists.sorted_lights(c), again.lists.sorted_lights(c));
        // Map shuffled slots back to original light indices.
        let mut mapped: Vec<u32> = permuted
            .lists
            .lights(c)
            .iter()
            .map(|&i| permutation[i as usize] as u32)
            .collect();
        mapped.sort_unstable();
        assert_eq!(first.lists.sorted_lights(c), mapped, "cluster {}", c);
    }
}

#[test]
fn test_counts_never_exceed_capacity() {
    let grid = scenario_grid();
    // Crowd everything into a small box in front of the camera.
    let bounds = LightBounds::new(Vec3::new(-2.0, -2.0, -12.0), Vec3::new(2.0, 2.0, -8.0));
    let positions: Vec<Vec3> = generate_lights(500, bounds, 3).iter().map(|l| l.position).collect();
    let lights = to_gpu(&positions);

    let out = cull_lights_cpu(&grid, &lights, Mat4::IDENTITY, 8, 3.0);
    let expected = brute_force_sets(&grid, &lights, Mat4::IDENTITY, 3.0);

    assert!(out.stats.saturated_clusters > 0);
    for c in 0..grid.cell_count() {
        let lights_in_c = out.lists.lights(c);
        assert!(out.lists.count(c) <= 8);
        let set: BTreeSet<u32> = lights_in_c.iter().copied().collect();
        assert_eq!(set.len(), lights_in_c.len(), "duplicates in cluster {}", c);
        assert!(set.is_subset(&expected[c as usize]), "false positive in cluster {}", c);
        // Unsaturated clusters must be complete.
        if expected[c as usize].len() <= 8 {
            assert_eq!(set, expected[c as usize]);
        }
    }
}

#[test]
fn test_fragment_lookup_reads_own_cluster() {
    let grid = scenario_grid();
    let target = grid.linear_index(8, 4, 0);
    let (position, radius) = exclusive_light(&grid, target);
    let out = cull_lights_cpu(&grid, &to_gpu(&[position]), Mat4::IDENTITY, 64, radius);

    // Tile (8, 4) spans pixels [960, 1080) x [480, 600); depth 1 is slice 0.
    assert_eq!(out.lists.lights_for_fragment(&grid, 1000.0, 500.0, 1.0), &[0]);
    assert!(out.lists.lights_for_fragment(&grid, 1000.0, 500.0, 10.0).is_empty());
    assert!(out.lists.lights_for_fragment(&grid, 100.0, 100.0, 1.0).is_empty());
}

#[test]
fn test_frustum_spanning_light_hits_every_cluster() {
    let grid = scenario_grid();
    let out = cull_lights_cpu(&grid, &to_gpu(&[Vec3::new(0.0, 0.0, -10.0)]), Mat4::IDENTITY, 4, 1000.0);
    assert_eq!(out.lists.non_empty_clusters(), grid.cell_count() as usize);
}

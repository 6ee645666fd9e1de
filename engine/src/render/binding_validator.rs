//! Shader Binding Validator
//!
//! Checks the bind group layouts built on the Rust side against the bindings
//! the cluster WGSL sources declare, before a mismatch turns into a GPU
//! validation error at dispatch time.
//!
//! The expected tables below are the canonical description of
//! `cluster_cull.wgsl` (group 0) and `cluster_shading.wgsl` (group 1).

use std::fmt;

/// Describes a single expected binding in a bind group layout.
#[derive(Debug, Clone)]
struct ExpectedBinding {
    binding: u32,
    binding_type: ExpectedBindingType,
    label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpectedBindingType {
    UniformBuffer,
    StorageBufferReadOnly,
    StorageBufferReadWrite,
    Other,
}

impl fmt::Display for ExpectedBindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniformBuffer => write!(f, "uniform buffer"),
            Self::StorageBufferReadOnly => write!(f, "storage buffer (read-only)"),
            Self::StorageBufferReadWrite => write!(f, "storage buffer (read-write)"),
            Self::Other => write!(f, "non-buffer binding"),
        }
    }
}

/// Expected layout for one bind group of a pipeline.
struct ExpectedBindGroup {
    pipeline_name: &'static str,
    group_index: u32,
    bindings: Vec<ExpectedBinding>,
}

fn classify_entry(entry: &wgpu::BindGroupLayoutEntry) -> ExpectedBindingType {
    match &entry.ty {
        wgpu::BindingType::Buffer { ty, .. } => match ty {
            wgpu::BufferBindingType::Uniform => ExpectedBindingType::UniformBuffer,
            wgpu::BufferBindingType::Storage { read_only: true } => ExpectedBindingType::StorageBufferReadOnly,
            wgpu::BufferBindingType::Storage { read_only: false } => ExpectedBindingType::StorageBufferReadWrite,
        },
        _ => ExpectedBindingType::Other,
    }
}

/// Returns the number of mismatches found.
fn validate_bind_group(expected: &ExpectedBindGroup, actual_entries: &[wgpu::BindGroupLayoutEntry]) -> u32 {
    let mut mismatches = 0u32;

    for exp in &expected.bindings {
        match actual_entries.iter().find(|e| e.binding == exp.binding) {
            None => {
                log::error!(
                    "[BindingValidator] MISMATCH in '{}' group {} binding {}: expected {} ({}), actual: MISSING",
                    expected.pipeline_name,
                    expected.group_index,
                    exp.binding,
                    exp.binding_type,
                    exp.label
                );
                mismatches += 1;
            }
            Some(actual) => {
                let actual_type = classify_entry(actual);
                if actual_type != exp.binding_type {
                    log::error!(
                        "[BindingValidator] MISMATCH in '{}' group {} binding {}: expected {} ({}), actual: {}",
                        expected.pipeline_name,
                        expected.group_index,
                        exp.binding,
                        exp.binding_type,
                        exp.label,
                        actual_type
                    );
                    mismatches += 1;
                }
            }
        }
    }

    for actual in actual_entries {
        if !expected.bindings.iter().any(|e| e.binding == actual.binding) {
            log::error!(
                "[BindingValidator] EXTRA binding in '{}' group {} binding {}: type {} not in shader expectations",
                expected.pipeline_name,
                expected.group_index,
                actual.binding,
                classify_entry(actual)
            );
            mismatches += 1;
        }
    }

    mismatches
}

fn cluster_cull_expectations() -> ExpectedBindGroup {
    use ExpectedBindingType::*;
    ExpectedBindGroup {
        pipeline_name: "Cluster Cull",
        group_index: 0,
        bindings: vec![
            ExpectedBinding { binding: 0, binding_type: UniformBuffer, label: "ClusterGridUniforms" },
            ExpectedBinding { binding: 1, binding_type: UniformBuffer, label: "CullParams" },
            ExpectedBinding { binding: 2, binding_type: StorageBufferReadOnly, label: "LightBuffer" },
            ExpectedBinding { binding: 3, binding_type: StorageBufferReadWrite, label: "LightIndexBuffer" },
            ExpectedBinding { binding: 4, binding_type: StorageBufferReadWrite, label: "TileBuffer" },
            ExpectedBinding { binding: 5, binding_type: StorageBufferReadWrite, label: "CullStats" },
        ],
    }
}

fn cluster_shading_expectations() -> ExpectedBindGroup {
    use ExpectedBindingType::*;
    ExpectedBindGroup {
        pipeline_name: "Cluster Shading",
        group_index: 1,
        bindings: vec![
            ExpectedBinding { binding: 0, binding_type: UniformBuffer, label: "ClusterGridUniforms" },
            ExpectedBinding { binding: 1, binding_type: StorageBufferReadOnly, label: "LightBuffer" },
            ExpectedBinding { binding: 2, binding_type: StorageBufferReadOnly, label: "LightIndexBuffer" },
            ExpectedBinding { binding: 3, binding_type: StorageBufferReadOnly, label: "TileBuffer" },
        ],
    }
}

/// Validate the culling pipeline's group 0. Returns the mismatch count.
pub fn validate_cull_bindings(entries: &[wgpu::BindGroupLayoutEntry]) -> u32 {
    validate_bind_group(&cluster_cull_expectations(), entries)
}

/// Validate the shading consumer's group 1. Returns the mismatch count.
pub fn validate_shading_bindings(entries: &[wgpu::BindGroupLayoutEntry]) -> u32 {
    validate_bind_group(&cluster_shading_expectations(), entries)
}

/// Run both validations and log a summary. Returns the total mismatch count.
pub fn validate_cluster_bindings(
    cull_entries: &[wgpu::BindGroupLayoutEntry],
    shading_entries: &[wgpu::BindGroupLayoutEntry],
) -> u32 {
    let total = validate_cull_bindings(cull_entries) + validate_shading_bindings(shading_entries);
    if total == 0 {
        log::debug!("[BindingValidator] cluster cull + shading bindings validated OK");
    } else {
        log::error!(
            "[BindingValidator] {} binding mismatch(es) found, GPU validation errors may occur",
            total
        );
    }
    total
}

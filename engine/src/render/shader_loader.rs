//! Shader Loading Utilities
//!
//! WGSL sources for the cluster pipelines are embedded at compile time and
//! composed by prepending `cluster_common.wgsl`, so the culling kernel and the
//! shading prelude share one definition of the grid constants and of
//! `cluster_index()`. Runtime loading is kept for hot-reload style tooling.

use std::path::Path;

/// Shader source that can be either embedded at compile time or loaded at runtime.
pub enum ShaderSource {
    /// Embedded shader source (no file I/O at runtime)
    Embedded(&'static str),
    /// Runtime-loaded or composed shader source
    Runtime(String),
}

impl ShaderSource {
    pub fn as_str(&self) -> &str {
        match self {
            ShaderSource::Embedded(s) => s,
            ShaderSource::Runtime(s) => s.as_str(),
        }
    }
}

/// Load a shader from the filesystem at runtime.
pub fn load_shader_file(path: impl AsRef<Path>) -> Result<ShaderSource, std::io::Error> {
    let source = std::fs::read_to_string(path)?;
    Ok(ShaderSource::Runtime(source))
}

/// Concatenate WGSL parts in order. WGSL resolves module-scope names
/// regardless of declaration order, so shared helpers may reference bindings
/// declared by a later part.
pub fn compose(parts: &[&str]) -> ShaderSource {
    ShaderSource::Runtime(parts.join("\n"))
}

/// Culling kernel with the shared grid definitions.
pub fn cluster_cull_source() -> ShaderSource {
    compose(&[embedded::CLUSTER_COMMON, embedded::CLUSTER_CULL])
}

/// Shading prelude with the shared grid definitions. A forward fragment
/// shader appends its own entry point to this.
pub fn cluster_shading_prelude() -> ShaderSource {
    compose(&[embedded::CLUSTER_COMMON, embedded::CLUSTER_SHADING])
}

/// Create a wgpu shader module from the given source.
pub fn create_shader_module(device: &wgpu::Device, label: &str, source: &ShaderSource) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.as_str().into()),
    })
}

/// Shader paths relative to the repository root, for runtime loading.
pub mod paths {
    pub const CLUSTER_COMMON: &str = "shaders/cluster_common.wgsl";
    pub const CLUSTER_CULL: &str = "shaders/cluster_cull.wgsl";
    pub const CLUSTER_SHADING: &str = "shaders/cluster_shading.wgsl";
}

/// Embedded shaders compiled into the binary.
pub mod embedded {
    /// Grid constants, structs, `cluster_index()`, `cluster_bounds()`
    pub const CLUSTER_COMMON: &str = include_str!("../../../shaders/cluster_common.wgsl");
    /// `cs_cull_lights`, bind group 0
    pub const CLUSTER_CULL: &str = include_str!("../../../shaders/cluster_cull.wgsl");
    /// Consumer bindings (group 1) and light list accessors
    pub const CLUSTER_SHADING: &str = include_str!("../../../shaders/cluster_shading.wgsl");
}

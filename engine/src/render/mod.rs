//! Render Module
//!
//! Clustered light culling: the grid that partitions the view volume, the
//! GPU buffers shared by culling and shading, the compute pass, the CPU
//! reference culler and the frame synchronisation policy.

pub mod binding_validator;
pub mod cluster_buffers;
pub mod cluster_grid;
pub mod cluster_layout;
pub mod cluster_lists;
pub mod clustered_lighting;
pub mod debug_viz;
pub mod frame_sync;
pub mod gpu_context;
pub mod light_culling;
pub mod light_culling_cpu;
pub mod light_population;
pub mod shader_loader;

// Re-export commonly used types for convenience
pub use cluster_buffers::{ClusterBindings, ClusterCapacity, ClusterLayouts, ClusterLightBuffers};
pub use cluster_grid::{ClusterAabb, ClusterCoord, ClusterGrid, ClusterProjection, ScreenRect};
pub use cluster_layout::{BufferSizes, ClusterGridUniforms, CullParams, CullStats, GpuLight, TileEntry};
pub use cluster_lists::ClusterLightLists;
pub use clustered_lighting::ClusteredLighting;
pub use frame_sync::{
    Barrier, BarrierKind, BufferingStrategy, DoubleBuffered, FramePhase, FrameSyncState, SingleBuffered,
    SyncBarrierPolicy, SyncStrategyKind,
};
pub use gpu_context::{GpuContext, GpuContextConfig};
pub use light_culling::LightCullingPass;
pub use light_culling_cpu::{cull_lights_cpu, CpuCullOutput, CpuLightCuller};
pub use light_population::{generate_lights, Light, LightBounds, LightPopulation};
pub use shader_loader::{create_shader_module, load_shader_file, ShaderSource};

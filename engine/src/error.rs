//! Error type for the clustered lighting core.
//!
//! Only construction-time and settings-change paths return errors. Per-frame
//! degradations (cluster saturation, a stale grid after resize) are silent by
//! design and never show up here.

use crate::render::frame_sync::FramePhase;

/// Errors raised while building or driving the clustered lighting subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Tile counts must be at least 1 in both directions.
    #[error("invalid tile count {x}x{y}: both must be at least 1")]
    InvalidTileCount { x: u32, y: u32 },

    /// The viewport extent is zero in at least one direction.
    #[error("viewport extent {width}x{height} is empty")]
    ZeroViewport { width: u32, height: u32 },

    /// A depth slice boundary is zero, negative or not finite.
    #[error("depth slice boundary {index} ({value}) must be positive and finite")]
    NonPositiveBoundary { index: usize, value: f32 },

    /// Depth slice boundaries are not strictly increasing.
    #[error("depth slice boundary {index} ({value}) is not greater than the previous one ({previous})")]
    NonIncreasingBoundaries { index: usize, previous: f32, value: f32 },

    /// More depth slices than the shared constant block can hold.
    #[error("{count} depth slices requested, at most {max} are supported")]
    TooManyDepthSlices { count: usize, max: usize },

    /// The cluster count does not fit the 32-bit indices shared with the kernel.
    #[error("{x}x{y} tiles over {slices} depth slices overflow the 32-bit cluster index")]
    TooManyClusters { x: u32, y: u32, slices: u32 },

    /// `cell_count * max_lights_per_cluster` does not fit a 32-bit slot index.
    #[error("{cell_count} clusters x {max_lights_per_cluster} lights overflow the 32-bit light slot index")]
    TooManyLightSlots { cell_count: u32, max_lights_per_cluster: u32 },

    /// A cluster buffer is larger than the device allows.
    #[error("buffer `{name}` needs {size} bytes, device limit is {limit}")]
    BufferTooLarge { name: &'static str, size: u64, limit: u64 },

    /// The culling dispatch needs more workgroups per dimension than the device allows.
    #[error("culling dispatch {x}x{y} workgroups exceeds the device limit of {limit} per dimension")]
    DispatchTooLarge { x: u32, y: u32, limit: u32 },

    /// Projection parameters cannot produce valid cluster bounds.
    #[error("invalid cluster projection: {0}")]
    InvalidProjection(String),

    /// A buffer capacity constant is zero.
    #[error("capacity `{name}` must be at least 1")]
    ZeroCapacity { name: &'static str },

    /// The frame synchronisation state machine was driven out of order.
    #[error("illegal frame transition from {from:?} to {to:?}")]
    IllegalTransition { from: FramePhase, to: FramePhase },

    /// A buffer set index outside the allocated sets was requested.
    #[error("buffer set {index} does not exist ({count} allocated)")]
    InvalidBufferSet { index: usize, count: usize },

    /// No suitable GPU adapter was found.
    #[error("no compute-capable GPU adapter: {0}")]
    AdapterUnavailable(String),

    /// The adapter refused to create a device.
    #[error("failed to create GPU device: {0}")]
    DeviceRequest(String),

    /// Mapping a readback buffer failed.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// Reading a config file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing a config file failed.
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    /// Encoding a debug image failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result alias used across the crate.
pub type ClusterResult<T> = Result<T, ClusterError>;

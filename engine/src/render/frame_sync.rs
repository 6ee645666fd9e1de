//! Frame Synchronisation Policy
//!
//! Orders culling writes against shading reads, within a frame and across frames:
//!
//! 1. Shading reads observe the current frame's completed culling writes
//!    (a `CullToShade` barrier every frame).
//! 2. The next frame's culling does not overwrite a buffer set that the
//!    previous frame's shading is still reading (a `ShadeToCull` barrier when
//!    both frames use the same set).
//!
//! The phase machine is `Idle → CullingInFlight → CullDone → ShadingInFlight →
//! ShadingDone → CullingInFlight`; anything else is rejected.
//!
//! On wgpu the actual memory barriers are inserted by the implementation at
//! pass boundaries on the single queue. This policy owns the legal ordering,
//! picks which buffer set each stage touches, and records the barriers a frame
//! required so a backend with explicit barriers (or a test) can replay them.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

/// Where a frame is in the cull → shade cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    Idle,
    CullingInFlight,
    CullDone,
    ShadingInFlight,
    ShadingDone,
}

impl FramePhase {
    /// The only legal edges of the phase machine.
    pub fn can_transition_to(self, to: FramePhase) -> bool {
        use FramePhase::*;
        matches!(
            (self, to),
            (Idle, CullingInFlight)
                | (CullingInFlight, CullDone)
                | (CullDone, ShadingInFlight)
                | (ShadingInFlight, ShadingDone)
                | (ShadingDone, CullingInFlight)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierKind {
    /// Culling writes → shading reads on the same buffer set.
    CullToShade,
    /// Previous frame's shading reads → this frame's culling writes.
    ShadeToCull,
}

/// A barrier placed on one buffer set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub kind: BarrierKind,
    pub buffer_set: usize,
}

/// One frame's record of which sets were touched and which barriers it needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameSyncState {
    pub frame: u64,
    pub cull_set: usize,
    pub shade_set: usize,
    pub barriers: Vec<Barrier>,
}

impl FrameSyncState {
    pub fn has_barrier(&self, kind: BarrierKind) -> bool {
        self.barriers.iter().any(|b| b.kind == kind)
    }
}

/// Chooses which buffer set culling writes and shading reads for a frame.
pub trait BufferingStrategy: Debug + Send + Sync {
    /// Buffer sets that must be allocated.
    fn set_count(&self) -> usize;

    /// Set written by culling in `frame`.
    fn cull_target(&self, frame: u64) -> usize;

    /// Set read by shading in `frame`.
    fn shade_source(&self, frame: u64) -> usize;

    fn name(&self) -> &'static str;
}

/// One buffer set. Every frame's culling waits on the previous frame's shading.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleBuffered;

impl BufferingStrategy for SingleBuffered {
    fn set_count(&self) -> usize {
        1
    }

    fn cull_target(&self, _frame: u64) -> usize {
        0
    }

    fn shade_source(&self, _frame: u64) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "single_buffered"
    }
}

/// Two buffer sets alternating by frame parity. Frame f+1 culls into the set
/// frame f is not shading from, so culling never waits on the previous shade.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleBuffered;

impl BufferingStrategy for DoubleBuffered {
    fn set_count(&self) -> usize {
        2
    }

    fn cull_target(&self, frame: u64) -> usize {
        (frame % 2) as usize
    }

    fn shade_source(&self, frame: u64) -> usize {
        (frame % 2) as usize
    }

    fn name(&self) -> &'static str {
        "double_buffered"
    }
}

/// Config-facing selector for the buffering strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategyKind {
    #[default]
    SingleBuffered,
    DoubleBuffered,
}

impl SyncStrategyKind {
    pub fn build(self) -> Box<dyn BufferingStrategy> {
        match self {
            SyncStrategyKind::SingleBuffered => Box::new(SingleBuffered),
            SyncStrategyKind::DoubleBuffered => Box::new(DoubleBuffered),
        }
    }
}

/// Drives the phase machine and decides barriers for each frame.
#[derive(Debug)]
pub struct SyncBarrierPolicy {
    strategy: Box<dyn BufferingStrategy>,
    phase: FramePhase,
    current: FrameSyncState,
    last_completed: Option<FrameSyncState>,
}

impl SyncBarrierPolicy {
    pub fn new(strategy: Box<dyn BufferingStrategy>) -> Self {
        Self {
            strategy,
            phase: FramePhase::Idle,
            current: FrameSyncState::default(),
            last_completed: None,
        }
    }

    pub fn from_kind(kind: SyncStrategyKind) -> Self {
        Self::new(kind.build())
    }

    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn set_count(&self) -> usize {
        self.strategy.set_count()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Record of the frame in flight (or the last one, once shading finished).
    pub fn current_state(&self) -> &FrameSyncState {
        &self.current
    }

    pub fn last_completed(&self) -> Option<&FrameSyncState> {
        self.last_completed.as_ref()
    }

    /// Frame number the next `begin_culling` will start.
    pub fn next_frame(&self) -> u64 {
        match self.phase {
            FramePhase::Idle => self.current.frame,
            _ => self.current.frame + 1,
        }
    }

    /// Buffer set the next `begin_culling` will write.
    pub fn next_cull_set(&self) -> usize {
        self.strategy.cull_target(self.next_frame())
    }

    fn transition(&mut self, to: FramePhase) -> ClusterResult<()> {
        if !self.phase.can_transition_to(to) {
            return Err(ClusterError::IllegalTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Start culling the next frame. Returns the buffer set to write.
    pub fn begin_culling(&mut self) -> ClusterResult<usize> {
        let first_frame = self.phase == FramePhase::Idle;
        let frame = self.next_frame();
        self.transition(FramePhase::CullingInFlight)?;

        let cull_set = self.strategy.cull_target(frame);
        let mut barriers = Vec::with_capacity(2);
        if !first_frame && cull_set == self.strategy.shade_source(frame - 1) {
            barriers.push(Barrier {
                kind: BarrierKind::ShadeToCull,
                buffer_set: cull_set,
            });
        }

        self.current = FrameSyncState {
            frame,
            cull_set,
            shade_set: self.strategy.shade_source(frame),
            barriers,
        };
        Ok(cull_set)
    }

    pub fn end_culling(&mut self) -> ClusterResult<()> {
        self.transition(FramePhase::CullDone)
    }

    /// Start shading. Returns the buffer set shading reads.
    pub fn begin_shading(&mut self) -> ClusterResult<usize> {
        self.transition(FramePhase::ShadingInFlight)?;
        let shade_set = self.current.shade_set;
        self.current.barriers.push(Barrier {
            kind: BarrierKind::CullToShade,
            buffer_set: shade_set,
        });
        Ok(shade_set)
    }

    /// Finish shading and close the frame record.
    pub fn end_shading(&mut self) -> ClusterResult<&FrameSyncState> {
        self.transition(FramePhase::ShadingDone)?;
        self.last_completed = Some(self.current.clone());
        Ok(&self.current)
    }

    /// Back to `Idle` after a grid rebuild; frame numbering restarts.
    pub fn reset(&mut self) {
        self.phase = FramePhase::Idle;
        self.current = FrameSyncState::default();
        self.last_completed = None;
    }
}

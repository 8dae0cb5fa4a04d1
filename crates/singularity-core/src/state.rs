//! Domain state of one singularity.
//!
//! The caller owns a [`SingularityState`] and hands it to every
//! `tick_phases` and transition call. The phase machinery mutates it but
//! never keeps it.

use serde::{Deserialize, Serialize};
use singularity_types::Phase;

/// World-border sub-state that follows the phase's target radius.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorderState {
    /// Current radius in blocks.
    pub radius: u32,
    /// Radius the border is moving toward.
    pub target: u32,
}

impl BorderState {
    /// A border at rest at `radius`.
    pub const fn at_rest(radius: u32) -> Self {
        Self {
            radius,
            target: radius,
        }
    }

    /// Whether the border has reached its target.
    pub const fn is_settled(&self) -> bool {
        self.radius == self.target
    }

    /// Move the radius at most `step` blocks toward the target.
    pub fn step_toward_target(&mut self, step: u32) {
        self.radius = if self.radius < self.target {
            self.radius.saturating_add(step).min(self.target)
        } else {
            self.radius.saturating_sub(step).max(self.target)
        };
    }
}

impl Default for BorderState {
    fn default() -> Self {
        Self::at_rest(512)
    }
}

/// The phase holder plus the flags the phase handlers work with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingularityState {
    /// The one active phase.
    pub phase: Phase,
    /// Whether a singularity is in progress.
    pub active: bool,
    /// Ticks spent in the current phase.
    pub ticks_in_phase: u64,
    /// Remaining fuse countdown while fusing.
    pub fuse_ticks_remaining: u64,
    /// Remaining units of reset work.
    pub reset_remaining: u64,
    /// World border.
    pub border: BorderState,
    /// Number of cycles that ran to completion.
    pub cycles_completed: u64,
}

impl SingularityState {
    /// A dormant singularity with the border resting at `radius`.
    pub fn dormant(radius: u32) -> Self {
        Self {
            border: BorderState::at_rest(radius),
            ..Self::default()
        }
    }

    /// Enter `phase` and restart the per-phase tick counter.
    pub const fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.ticks_in_phase = 0;
    }
}

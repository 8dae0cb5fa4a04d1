//! The orchestrator lifecycle gate.
//!
//! [`LifecycleGate`] stores an [`OrchestratorState`] in an [`AtomicU8`] so
//! the tick thread and a shutdown request from another thread agree on
//! whether it is safe to run. Transitions only move forward and are made
//! with compare-and-swap, so exactly one caller wins each transition.

use std::sync::atomic::{AtomicU8, Ordering};

use singularity_types::OrchestratorState;

/// Shared, forward-only lifecycle state.
#[derive(Debug)]
pub struct LifecycleGate {
    state: AtomicU8,
}

impl LifecycleGate {
    /// Create a gate in [`OrchestratorState::Initializing`].
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(OrchestratorState::Initializing.as_u8()),
        }
    }

    /// Current state.
    pub fn state(&self) -> OrchestratorState {
        OrchestratorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether ticking and transitions are allowed.
    pub fn is_running(&self) -> bool {
        self.state() == OrchestratorState::Running
    }

    /// Move from `from` to `to`.
    ///
    /// Fails (returning the actual current state) if the gate is not in
    /// `from`, or if `to` would move backward.
    pub fn advance(
        &self,
        from: OrchestratorState,
        to: OrchestratorState,
    ) -> Result<(), OrchestratorState> {
        if to <= from {
            return Err(self.state());
        }
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_previous| ())
            .map_err(OrchestratorState::from_u8)
    }

    /// Begin teardown from any pre-teardown state.
    ///
    /// Returns the state teardown started from, or `None` if another caller
    /// already started it.
    pub fn begin_shutdown(&self) -> Option<OrchestratorState> {
        for from in [OrchestratorState::Running, OrchestratorState::Initializing] {
            if self.advance(from, OrchestratorState::ShuttingDown).is_ok() {
                return Some(from);
            }
        }
        None
    }
}

impl Default for LifecycleGate {
    fn default() -> Self {
        Self::new()
    }
}

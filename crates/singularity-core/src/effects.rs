//! Events the core posts on the effect bus.
//!
//! Rendering, sound and persistence layers listen for these; the core never
//! calls them directly.

use singularity_types::{OrchestratorState, Phase, ScenarioId, WorldKey};

/// A named phase transition completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseChanged {
    /// World the singularity belongs to.
    pub world: WorldKey,
    /// Phase before the transition.
    pub from: Phase,
    /// Phase after the transition.
    pub to: Phase,
    /// Game time of the transition.
    pub game_time: u64,
}

/// A scenario finished its attach hook and became active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioAttached {
    /// World the scenario is attached to.
    pub world: WorldKey,
    /// The attached scenario.
    pub scenario: ScenarioId,
}

/// The active scenario was detached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioDetached {
    /// World the scenario was attached to.
    pub world: WorldKey,
    /// The detached scenario.
    pub scenario: ScenarioId,
}

/// The orchestrator moved to a new lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleChanged {
    /// Previous state.
    pub from: OrchestratorState,
    /// New state.
    pub to: OrchestratorState,
}

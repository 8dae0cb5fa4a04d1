//! The singularity phase machine.
//!
//! A singularity moves through seven phases. Exactly one is active at a
//! time, stored in the caller's [`SingularityState`]. Each phase has one
//! [`PhaseHandler`] in a [`PhaseHandlerTable`]; the [`PhaseManager`] runs
//! the handler for the current phase every tick. Handlers never assign the
//! phase directly. They call the named transitions on their
//! [`PhaseContext`], which check the lifecycle gate and the source phase,
//! restore the state on failure, and announce the change.
//!
//! # Modules
//!
//! - [`context`] -- [`PhaseContext`], the per-call dependency bundle.
//! - [`transitions`] -- [`PhaseTransitions`], the guarded named transitions.
//! - [`manager`] -- [`PhaseManager`], the per-tick dispatcher.
//!
//! [`SingularityState`]: crate::state::SingularityState

pub mod context;
pub mod manager;
pub mod transitions;

use singularity_types::{OrchestratorState, Phase};

pub use context::PhaseContext;
pub use manager::PhaseManager;
pub use transitions::PhaseTransitions;

/// Errors raised by phase handlers and transitions.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    /// The orchestrator is not running, so no transition may happen.
    #[error("transition {transition} refused: orchestrator is {state}")]
    NotRunning {
        /// Name of the refused transition.
        transition: &'static str,
        /// Lifecycle state at the time of the call.
        state: OrchestratorState,
    },

    /// The transition does not start from the current phase.
    #[error("transition {transition} is not valid from phase {from}")]
    InvalidTransition {
        /// Name of the refused transition.
        transition: &'static str,
        /// Phase the state was in.
        from: Phase,
    },

    /// A handler reported a failure.
    #[error("{phase} handler failed: {reason}")]
    Handler {
        /// Phase whose handler failed.
        phase: Phase,
        /// What went wrong.
        reason: String,
    },

    /// A handler or transition panicked.
    #[error("phase code panicked: {message}")]
    Panicked {
        /// The panic payload, rendered as text.
        message: String,
    },
}

/// Behavior for one phase.
pub trait PhaseHandler: Send {
    /// Advance the phase by one tick.
    fn tick(&mut self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError>;

    /// Release anything the handler holds. Called once at shutdown.
    fn shutdown(&mut self) {}
}

/// Handler that does nothing; the default for every slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleHandler;

impl PhaseHandler for IdleHandler {
    fn tick(&mut self, _ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        Ok(())
    }
}

/// One handler per phase plus one for "no singularity active".
///
/// Every field must be filled, so adding a phase is a compile error here
/// until it has a handler.
pub struct PhaseHandlerTable {
    /// Runs while dormant and active (a cycle armed but not yet lit).
    pub dormant: Box<dyn PhaseHandler>,
    /// Runs while the fuse burns.
    pub fusing: Box<dyn PhaseHandler>,
    /// Runs while collapsing.
    pub collapse: Box<dyn PhaseHandler>,
    /// Runs while the core is stable.
    pub core: Box<dyn PhaseHandler>,
    /// Runs while the ring exists.
    pub ring: Box<dyn PhaseHandler>,
    /// Runs while the ring disperses.
    pub dissipation: Box<dyn PhaseHandler>,
    /// Runs while the world is restored.
    pub reset: Box<dyn PhaseHandler>,
    /// Runs instead of any of the above when no singularity is active.
    pub inactive: Box<dyn PhaseHandler>,
}

impl PhaseHandlerTable {
    /// A table of [`IdleHandler`]s.
    pub fn idle() -> Self {
        Self {
            dormant: Box::new(IdleHandler),
            fusing: Box::new(IdleHandler),
            collapse: Box::new(IdleHandler),
            core: Box::new(IdleHandler),
            ring: Box::new(IdleHandler),
            dissipation: Box::new(IdleHandler),
            reset: Box::new(IdleHandler),
            inactive: Box::new(IdleHandler),
        }
    }

    /// The handler for `phase`.
    pub fn handler_mut(&mut self, phase: Phase) -> &mut dyn PhaseHandler {
        match phase {
            Phase::Dormant => self.dormant.as_mut(),
            Phase::Fusing => self.fusing.as_mut(),
            Phase::Collapse => self.collapse.as_mut(),
            Phase::Core => self.core.as_mut(),
            Phase::Ring => self.ring.as_mut(),
            Phase::Dissipation => self.dissipation.as_mut(),
            Phase::Reset => self.reset.as_mut(),
        }
    }

    /// Every handler with a label, inactive last.
    pub fn all_mut(&mut self) -> [(&'static str, &mut dyn PhaseHandler); 8] {
        [
            ("dormant", self.dormant.as_mut()),
            ("fusing", self.fusing.as_mut()),
            ("collapse", self.collapse.as_mut()),
            ("core", self.core.as_mut()),
            ("ring", self.ring.as_mut()),
            ("dissipation", self.dissipation.as_mut()),
            ("reset", self.reset.as_mut()),
            ("inactive", self.inactive.as_mut()),
        ]
    }
}

impl Default for PhaseHandlerTable {
    fn default() -> Self {
        Self::idle()
    }
}

impl core::fmt::Debug for PhaseHandlerTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhaseHandlerTable").finish_non_exhaustive()
    }
}

//! Per-tick phase dispatch.

use std::sync::Arc;

use singularity_events::isolate;
use singularity_types::Phase;
use tracing::{debug, error, info, warn};

use super::{PhaseContext, PhaseError, PhaseHandler, PhaseHandlerTable, PhaseTransitions};
use crate::config::SingularityProfile;
use crate::lifecycle::LifecycleGate;
use crate::services::ServiceHub;
use crate::state::SingularityState;
use crate::world::WorldHandle;

/// Dispatches each tick to the handler of the current phase.
///
/// Holds no phase of its own: the phase lives in the caller's
/// [`SingularityState`].
#[derive(Debug)]
pub struct PhaseManager {
    handlers: PhaseHandlerTable,
    transitions: PhaseTransitions,
    profile: Arc<SingularityProfile>,
}

impl PhaseManager {
    /// Create a manager whose transitions are checked against `gate`.
    pub const fn new(
        handlers: PhaseHandlerTable,
        profile: Arc<SingularityProfile>,
        gate: Arc<LifecycleGate>,
    ) -> Self {
        Self {
            handlers,
            transitions: PhaseTransitions::new(gate),
            profile,
        }
    }

    /// The profile handlers and transitions read durations from.
    pub const fn profile(&self) -> &Arc<SingularityProfile> {
        &self.profile
    }

    /// One phase tick.
    ///
    /// Border bookkeeping and the phase tick counter run first, whatever the
    /// phase. Then the inactive handler runs if no singularity is active,
    /// otherwise the handler for exactly the current phase. Handler errors
    /// and panics are logged. Returns the phase dispatched to, or `None` for
    /// the inactive handler.
    pub fn tick(
        &mut self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
        services: &ServiceHub,
    ) -> Option<Phase> {
        let phase = state.phase;
        state.border.target = self.profile.border.target_for(phase);
        state.border.step_toward_target(self.profile.border.step);
        state.ticks_in_phase = state.ticks_in_phase.saturating_add(1);

        let active = state.active;
        let mut ctx = PhaseContext::new(world, state, services, &self.profile, &self.transitions);
        let (label, handler): (&str, &mut dyn PhaseHandler) = if active {
            ("phase", self.handlers.handler_mut(phase))
        } else {
            ("inactive", self.handlers.inactive.as_mut())
        };

        let result = isolate::guarded(|| handler.tick(&mut ctx))
            .unwrap_or_else(|message| Err(PhaseError::Panicked { message }));
        if let Err(err) = result {
            warn!(world = %world.key(), handler = label, phase = %phase, error = %err, "Phase handler failed");
        }
        debug!(world = %world.key(), phase = %phase, active, "Phase tick");
        active.then_some(phase)
    }

    /// Run a transition outside a handler, with a freshly built context.
    pub fn with_context<R>(
        &self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
        services: &ServiceHub,
        f: impl FnOnce(&PhaseTransitions, &mut PhaseContext<'_>) -> R,
    ) -> R {
        let mut ctx = PhaseContext::new(world, state, services, &self.profile, &self.transitions);
        f(&self.transitions, &mut ctx)
    }

    /// Call every handler's shutdown hook. A panicking hook does not stop
    /// the others.
    pub fn shutdown(&mut self) {
        for (label, handler) in self.handlers.all_mut() {
            if let Err(panic) = isolate::guarded(|| handler.shutdown()) {
                error!(handler = label, panic = %panic, "Phase handler shutdown panicked");
            }
        }
        info!("Phase manager shut down");
    }
}

//! Named, guarded phase transitions.
//!
//! Every transition follows the same protocol:
//!
//! 1. Refuse unless the lifecycle gate is `Running`.
//! 2. Refuse unless the current phase is a valid source.
//! 3. Apply the change with panics contained. On error or panic the state
//!    is restored to its pre-transition value.
//! 4. On success post [`PhaseChanged`] and queue an announcement.
//!
//! A reset batch stays in `Reset`, so it runs steps 1 to 3 only and reaches
//! step 4 through [`PhaseTransitions::finish_singularity`].

use std::sync::Arc;

use singularity_events::{EffectBusExt, isolate};
use singularity_types::Phase;
use tracing::{debug, info, warn};

use super::{PhaseContext, PhaseError};
use crate::config::SingularityProfile;
use crate::effects::PhaseChanged;
use crate::lifecycle::LifecycleGate;
use crate::state::SingularityState;

/// Player-facing text for entering `phase`.
const fn announcement_for(phase: Phase) -> &'static str {
    match phase {
        Phase::Dormant => "The singularity has passed.",
        Phase::Fusing => "The fuse is lit. Something is gathering.",
        Phase::Collapse => "The world is collapsing inward!",
        Phase::Core => "A core has formed.",
        Phase::Ring => "A ring is forming around the core.",
        Phase::Dissipation => "The ring is dissipating.",
        Phase::Reset => "The world is being restored.",
    }
}

/// The transition gate shared by the phase manager and handler contexts.
#[derive(Debug, Clone)]
pub struct PhaseTransitions {
    gate: Arc<LifecycleGate>,
}

impl PhaseTransitions {
    /// Transitions checked against `gate`.
    pub const fn new(gate: Arc<LifecycleGate>) -> Self {
        Self { gate }
    }

    /// Steps 1 and 2: the gate and the source phase. Returns the source.
    fn admit(
        &self,
        ctx: &PhaseContext<'_>,
        transition: &'static str,
        sources: fn(Phase) -> bool,
    ) -> Result<Phase, PhaseError> {
        let state_now = self.gate.state();
        if !self.gate.is_running() {
            debug!(transition, state = %state_now, "Transition refused, orchestrator not running");
            return Err(PhaseError::NotRunning {
                transition,
                state: state_now,
            });
        }

        let from = ctx.state().phase;
        if !sources(from) {
            warn!(transition, from = %from, "Transition not valid from current phase");
            return Err(PhaseError::InvalidTransition { transition, from });
        }
        Ok(from)
    }

    fn run(
        &self,
        ctx: &mut PhaseContext<'_>,
        transition: &'static str,
        sources: fn(Phase) -> bool,
        apply: impl FnOnce(&mut SingularityState, &SingularityProfile),
    ) -> Result<(), PhaseError> {
        let from = self.admit(ctx, transition, sources)?;
        apply_contained(ctx, transition, apply)?;

        let to = ctx.state().phase;
        let world = ctx.world();
        info!(
            transition,
            world = %world.key(),
            from = %from,
            to = %to,
            game_time = world.game_time(),
            "Phase transition"
        );
        ctx.bus().post(&PhaseChanged {
            world: world.key().clone(),
            from,
            to,
            game_time: world.game_time(),
        });
        ctx.announce(announcement_for(to));
        Ok(())
    }

    /// `Dormant -> Fusing`: light the fuse.
    pub fn begin_fusing(&self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        self.run(
            ctx,
            "begin_fusing",
            |phase| phase == Phase::Dormant,
            |state, profile| {
                state.active = true;
                state.fuse_ticks_remaining = profile.fuse_ticks;
                state.reset_remaining = 0;
                state.enter(Phase::Fusing);
            },
        )
    }

    /// `Fusing -> Collapse`: the fuse ran out.
    pub fn handle_fuse_countdown_complete(
        &self,
        ctx: &mut PhaseContext<'_>,
    ) -> Result<(), PhaseError> {
        self.run(
            ctx,
            "handle_fuse_countdown_complete",
            |phase| phase == Phase::Fusing,
            |state, _| {
                state.fuse_ticks_remaining = 0;
                state.enter(Phase::Collapse);
            },
        )
    }

    /// `Collapse -> Core`.
    pub fn enter_core(&self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        self.run(
            ctx,
            "enter_core",
            |phase| phase == Phase::Collapse,
            |state, _| state.enter(Phase::Core),
        )
    }

    /// `Core -> Ring`.
    pub fn enter_ring(&self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        self.run(
            ctx,
            "enter_ring",
            |phase| phase == Phase::Core,
            |state, _| state.enter(Phase::Ring),
        )
    }

    /// `Ring -> Dissipation`.
    pub fn begin_dissipation(&self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        self.run(
            ctx,
            "begin_dissipation",
            |phase| phase == Phase::Ring,
            |state, _| state.enter(Phase::Dissipation),
        )
    }

    /// Any post-collapse phase `-> Reset`: queue the restoration work.
    pub fn start_post_collapse_reset(&self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        self.run(
            ctx,
            "start_post_collapse_reset",
            Phase::is_post_collapse,
            |state, profile| {
                state.reset_remaining = profile.reset_work;
                state.enter(Phase::Reset);
            },
        )
    }

    /// Consume one batch of reset work; finish the cycle once none is left.
    pub fn process_singularity_reset(&self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        const TRANSITION: &str = "process_singularity_reset";
        self.admit(ctx, TRANSITION, |phase| phase == Phase::Reset)?;
        apply_contained(ctx, TRANSITION, |state, profile| {
            state.reset_remaining = state.reset_remaining.saturating_sub(profile.reset_batch);
        })?;

        let remaining = ctx.state().reset_remaining;
        debug!(world = %ctx.world().key(), remaining, "Reset batch processed");
        if remaining == 0 {
            self.finish_singularity(ctx)?;
        }
        Ok(())
    }

    /// `Reset -> Dormant`: the cycle is complete.
    pub fn finish_singularity(&self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        self.run(
            ctx,
            "finish_singularity",
            |phase| phase == Phase::Reset,
            |state, _| {
                state.active = false;
                state.reset_remaining = 0;
                state.cycles_completed = state.cycles_completed.saturating_add(1);
                state.enter(Phase::Dormant);
            },
        )
    }

    /// Any non-dormant phase `-> Dormant` without completing the cycle.
    ///
    /// Returns `true` only if an abort actually happened.
    pub fn abort_singularity(&self, ctx: &mut PhaseContext<'_>) -> bool {
        self.run(
            ctx,
            "abort_singularity",
            |phase| phase != Phase::Dormant,
            |state, _| {
                state.active = false;
                state.fuse_ticks_remaining = 0;
                state.reset_remaining = 0;
                state.enter(Phase::Dormant);
            },
        )
        .is_ok()
    }
}

/// Step 3: apply `apply`, restoring the previous state if it panics.
fn apply_contained(
    ctx: &mut PhaseContext<'_>,
    transition: &'static str,
    apply: impl FnOnce(&mut SingularityState, &SingularityProfile),
) -> Result<(), PhaseError> {
    let before = ctx.state().clone();
    let profile = ctx.profile();
    if let Err(message) = isolate::guarded(|| apply(ctx.state_mut(), profile)) {
        warn!(transition, from = %before.phase, panic = %message, "Transition failed, state restored");
        *ctx.state_mut() = before;
        return Err(PhaseError::Panicked { message });
    }
    Ok(())
}

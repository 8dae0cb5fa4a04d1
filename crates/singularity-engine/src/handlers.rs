//! Phase handlers the engine runs a singularity cycle with.
//!
//! Every timed phase advances once it has lasted the profile's duration.
//! The fuse counts down its own counter so a restored state resumes the
//! countdown where it left off.

use singularity_core::phase::{IdleHandler, PhaseContext, PhaseError, PhaseHandler, PhaseHandlerTable};
use singularity_types::Phase;
use tracing::debug;

/// Fuse counts at which players are warned.
const FUSE_WARNINGS: [u64; 4] = [20, 10, 5, 3];

/// Burns down `fuse_ticks_remaining` and triggers the collapse at zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuseHandler;

impl PhaseHandler for FuseHandler {
    fn tick(&mut self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        let remaining = ctx.state().fuse_ticks_remaining.saturating_sub(1);
        ctx.state_mut().fuse_ticks_remaining = remaining;
        if remaining == 0 {
            return ctx.handle_fuse_countdown_complete();
        }
        if FUSE_WARNINGS.contains(&remaining) {
            ctx.announce(format!("Collapse in {remaining} ticks."));
        }
        Ok(())
    }
}

/// Leaves its phase once the profile's duration for it has elapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimedHandler;

impl PhaseHandler for TimedHandler {
    fn tick(&mut self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        let phase = ctx.state().phase;
        let Some(duration) = ctx.profile().phase_duration(phase) else {
            return Ok(());
        };
        if ctx.state().ticks_in_phase < duration {
            return Ok(());
        }
        debug!(phase = %phase, duration, "Phase duration elapsed");
        match phase {
            Phase::Collapse => ctx.enter_core(),
            Phase::Core => ctx.enter_ring(),
            Phase::Ring => ctx.begin_dissipation(),
            Phase::Dissipation => ctx.start_post_collapse_reset(),
            Phase::Dormant | Phase::Fusing | Phase::Reset => Ok(()),
        }
    }
}

/// Works through the restoration queue one batch per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetHandler;

impl PhaseHandler for ResetHandler {
    fn tick(&mut self, ctx: &mut PhaseContext<'_>) -> Result<(), PhaseError> {
        ctx.process_singularity_reset()
    }
}

/// The handler table the engine boots with.
pub fn default_handlers() -> PhaseHandlerTable {
    PhaseHandlerTable {
        dormant: Box::new(IdleHandler),
        fusing: Box::new(FuseHandler),
        collapse: Box::new(TimedHandler),
        core: Box::new(TimedHandler),
        ring: Box::new(TimedHandler),
        dissipation: Box::new(TimedHandler),
        reset: Box::new(ResetHandler),
        inactive: Box::new(IdleHandler),
    }
}

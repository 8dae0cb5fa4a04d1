//! Tick loop runner with operator controls.
//!
//! [`run_simulation`] drives an [`Orchestrator`] at the operator's tick
//! interval with support for:
//!
//! - **Bounded runs**: stop after `max_ticks`
//! - **Pause/resume**: the operator can halt and continue the loop
//! - **Variable tick speed**: the interval is re-read every iteration
//! - **Clean stop**: on operator request, or when the orchestrator is shut
//!   down from elsewhere
//!
//! Each iteration advances the world clock, then calls
//! [`Orchestrator::tick`] followed by [`Orchestrator::tick_phases`].

use std::sync::Arc;

use serde::Serialize;
use singularity_types::{OrchestratorState, Phase};
use tracing::{info, warn};

use crate::operator::{OperatorState, SimulationEndReason};
use crate::orchestrator::Orchestrator;
use crate::state::SingularityState;
use crate::world::{SimWorld, WorldHandle};

/// Errors that can occur when starting the loop.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The orchestrator was not running when the loop started.
    #[error("orchestrator is {state}, refusing to run")]
    NotRunning {
        /// The orchestrator's state at the time.
        state: OrchestratorState,
    },
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Game time after the tick.
    pub game_time: u64,
    /// Phase after the tick.
    pub phase: Phase,
    /// Whether a singularity is active after the tick.
    pub singularity_active: bool,
    /// Tasks still queued after the tick.
    pub pending_tasks: usize,
}

/// Result of a loop run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The reason the loop ended.
    pub end_reason: SimulationEndReason,
    /// The last tick summary, if any tick ran.
    pub final_summary: Option<TickSummary>,
    /// Total number of ticks executed.
    pub total_ticks: u64,
}

/// Callback invoked after each tick.
pub trait TickCallback: Send {
    /// Called after a tick completes.
    fn on_tick(&mut self, summary: &TickSummary, state: &SingularityState);
}

/// A callback that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary, _state: &SingularityState) {}
}

/// Run the tick loop until a termination condition is met.
///
/// # Errors
///
/// Returns [`RunnerError::NotRunning`] if the orchestrator is not running
/// when the loop starts.
pub async fn run_simulation(
    orchestrator: &Orchestrator,
    world: &mut SimWorld,
    state: &mut SingularityState,
    operator: &Arc<OperatorState>,
    callback: &mut dyn TickCallback,
) -> Result<SimulationResult, RunnerError> {
    let orchestrator_state = orchestrator.state();
    if orchestrator_state != OrchestratorState::Running {
        return Err(RunnerError::NotRunning {
            state: orchestrator_state,
        });
    }

    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;

    info!(
        world = %world.key(),
        max_ticks = operator.max_ticks(),
        tick_interval_ms = operator.tick_interval_ms(),
        "Tick loop starting"
    );

    let end_reason = loop {
        // --- Check pause ---
        if operator.is_paused() {
            info!("Tick loop paused, waiting for resume...");
            operator.wait_if_paused().await;
            info!("Tick loop resumed");
        }

        // --- Check stop conditions (before tick) ---
        if operator.is_stop_requested() {
            info!("Operator stop requested");
            break SimulationEndReason::OperatorStop;
        }
        if orchestrator.state().is_terminating() {
            warn!(state = %orchestrator.state(), "Orchestrator stopped underneath the loop");
            break SimulationEndReason::OrchestratorShutdown;
        }

        // --- Execute tick ---
        world.advance();
        orchestrator.tick(world);
        orchestrator.tick_phases(world, state);
        total_ticks = total_ticks.saturating_add(1);

        let summary = TickSummary {
            game_time: world.game_time(),
            phase: state.phase,
            singularity_active: state.active,
            pending_tasks: orchestrator.services().scheduler().pending_tasks(),
        };
        callback.on_tick(&summary, state);
        last_summary = Some(summary);

        // --- Check tick limit (after tick) ---
        if operator.tick_limit_reached(total_ticks) {
            info!(
                total_ticks,
                max_ticks = operator.max_ticks(),
                "Tick limit reached"
            );
            break SimulationEndReason::MaxTicksReached;
        }

        // --- Sleep for tick interval ---
        let interval_ms = operator.tick_interval_ms();
        if interval_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(interval_ms)).await;
        }
    };

    operator.set_end_reason(end_reason).await;
    Ok(SimulationResult {
        end_reason,
        final_summary: last_summary,
        total_ticks,
    })
}

/// Log how the loop ended.
pub fn log_simulation_end(result: &SimulationResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        "Tick loop ended"
    );

    if let Some(summary) = &result.final_summary {
        info!(
            game_time = summary.game_time,
            phase = %summary.phase,
            singularity_active = summary.singularity_active,
            pending_tasks = summary.pending_tasks,
            "Final tick summary"
        );
    } else {
        warn!("Tick loop ended with no ticks executed");
    }
}

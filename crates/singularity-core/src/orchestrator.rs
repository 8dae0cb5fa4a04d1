//! The orchestrator: the single entry point the host ticks.
//!
//! The orchestrator owns the service hub, the scenario manager and the
//! phase manager, and shares one [`LifecycleGate`] with the phase
//! transitions. It is composed once from [`OrchestratorParts`], moves to
//! `Running` as soon as composition finishes, and is torn down exactly once
//! by [`Orchestrator::shutdown`], which may be called from any thread.
//!
//! Per host tick the caller invokes [`Orchestrator::tick`] (services and
//! scenarios) and [`Orchestrator::tick_phases`] (the singularity phase
//! machine). Both return immediately unless the orchestrator is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use singularity_events::EffectBusExt;
use singularity_types::{OrchestratorState, Phase, ScenarioId};
use tracing::{debug, info, warn};

use crate::config::SingularityProfile;
use crate::effects::LifecycleChanged;
use crate::lifecycle::LifecycleGate;
use crate::phase::{PhaseContext, PhaseError, PhaseHandlerTable, PhaseManager, PhaseTransitions};
use crate::scenario::{ScenarioManager, ScenarioRegistry};
use crate::services::ServiceHub;
use crate::state::SingularityState;
use crate::world::WorldHandle;

/// Collaborators the orchestrator is composed from.
#[derive(Debug)]
pub struct OrchestratorParts {
    /// Installed services.
    pub services: ServiceHub,
    /// Scenario factories and bindings.
    pub registry: Arc<ScenarioRegistry>,
    /// One handler per phase.
    pub handlers: PhaseHandlerTable,
    /// Phase durations and sizes.
    pub profile: Arc<SingularityProfile>,
}

/// Composition root of the orchestration core.
#[derive(Debug)]
pub struct Orchestrator {
    gate: Arc<LifecycleGate>,
    services: ServiceHub,
    scenarios: Mutex<ScenarioManager>,
    phases: Mutex<PhaseManager>,
    /// Last `active` flag seen by `tick_phases`, fed to scenario infection.
    singularity_active: AtomicBool,
}

impl Orchestrator {
    /// Compose the orchestrator and start running.
    pub fn new(parts: OrchestratorParts) -> Self {
        let OrchestratorParts {
            services,
            registry,
            handlers,
            profile,
        } = parts;
        let gate = Arc::new(LifecycleGate::new());
        let orchestrator = Self {
            scenarios: Mutex::new(ScenarioManager::new(registry)),
            phases: Mutex::new(PhaseManager::new(handlers, profile, Arc::clone(&gate))),
            gate,
            services,
            singularity_active: AtomicBool::new(false),
        };
        orchestrator.advance(OrchestratorState::Initializing, OrchestratorState::Running);
        orchestrator
    }

    fn advance(&self, from: OrchestratorState, to: OrchestratorState) {
        match self.gate.advance(from, to) {
            Ok(()) => {
                info!(from = %from, to = %to, "Orchestrator state changed");
                self.services.bus().post(&LifecycleChanged { from, to });
            }
            Err(actual) => {
                warn!(from = %from, to = %to, actual = %actual, "Lifecycle transition skipped");
            }
        }
    }

    fn scenarios(&self) -> MutexGuard<'_, ScenarioManager> {
        self.scenarios.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phases(&self) -> MutexGuard<'_, PhaseManager> {
        self.phases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.gate.state()
    }

    /// Whether teardown has started: `ShuttingDown` or `Shutdown`.
    pub fn is_shutdown(&self) -> bool {
        self.state().is_terminating()
    }

    /// The service hub.
    pub const fn services(&self) -> &ServiceHub {
        &self.services
    }

    /// The scenario registry.
    pub fn registry(&self) -> Arc<ScenarioRegistry> {
        Arc::clone(self.scenarios().registry())
    }

    /// Id of the attached scenario, if any.
    pub fn active_scenario_id(&self) -> Option<ScenarioId> {
        self.scenarios().active_scenario_id().cloned()
    }

    /// Advance services and the attached scenario by one tick.
    pub fn tick(&self, world: &dyn WorldHandle) {
        match self.state() {
            OrchestratorState::Running => {}
            OrchestratorState::Shutdown => {
                warn!(world = %world.key(), "Tick after shutdown ignored");
                return;
            }
            state => {
                debug!(world = %world.key(), state = %state, "Tick ignored, not running");
                return;
            }
        }

        let report = self.services.tick(world);
        let bus = self.services.bus();
        let active = self.singularity_active.load(Ordering::Acquire);
        let mut scenarios = self.scenarios();
        // Shutdown may have run, on this thread or another, since the check above.
        if !self.gate.is_running() {
            debug!(world = %world.key(), "Scenario tick skipped, shutdown started");
            return;
        }
        scenarios.tick(world, active, bus.as_ref());
        drop(scenarios);
        debug!(
            world = %world.key(),
            game_time = world.game_time(),
            tasks_executed = report.executed,
            tasks_failed = report.failed,
            "Tick complete"
        );
    }

    /// Advance the singularity phase machine by one tick.
    ///
    /// Returns the phase dispatched to, or `None` if the inactive handler
    /// ran or the orchestrator is not running.
    pub fn tick_phases(&self, world: &dyn WorldHandle, state: &mut SingularityState) -> Option<Phase> {
        if !self.gate.is_running() {
            debug!(world = %world.key(), "Phase tick ignored, not running");
            return None;
        }
        let dispatched = self.phases().tick(world, state, &self.services);
        self.singularity_active.store(state.active, Ordering::Release);
        dispatched
    }

    fn transition<R>(
        &self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
        f: impl FnOnce(&PhaseTransitions, &mut PhaseContext<'_>) -> R,
    ) -> R {
        let result = self.phases().with_context(world, state, &self.services, f);
        self.singularity_active.store(state.active, Ordering::Release);
        result
    }

    /// Light the fuse. See [`PhaseTransitions::begin_fusing`].
    pub fn begin_fusing(&self, world: &dyn WorldHandle, state: &mut SingularityState) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.begin_fusing(ctx))
    }

    /// See [`PhaseTransitions::handle_fuse_countdown_complete`].
    pub fn handle_fuse_countdown_complete(
        &self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
    ) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.handle_fuse_countdown_complete(ctx))
    }

    /// See [`PhaseTransitions::enter_core`].
    pub fn enter_core(&self, world: &dyn WorldHandle, state: &mut SingularityState) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.enter_core(ctx))
    }

    /// See [`PhaseTransitions::enter_ring`].
    pub fn enter_ring(&self, world: &dyn WorldHandle, state: &mut SingularityState) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.enter_ring(ctx))
    }

    /// See [`PhaseTransitions::begin_dissipation`].
    pub fn begin_dissipation(
        &self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
    ) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.begin_dissipation(ctx))
    }

    /// See [`PhaseTransitions::start_post_collapse_reset`].
    pub fn start_post_collapse_reset(
        &self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
    ) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.start_post_collapse_reset(ctx))
    }

    /// See [`PhaseTransitions::process_singularity_reset`].
    pub fn process_singularity_reset(
        &self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
    ) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.process_singularity_reset(ctx))
    }

    /// See [`PhaseTransitions::finish_singularity`].
    pub fn finish_singularity(
        &self,
        world: &dyn WorldHandle,
        state: &mut SingularityState,
    ) -> Result<(), PhaseError> {
        self.transition(world, state, |t, ctx| t.finish_singularity(ctx))
    }

    /// Abort a running singularity. Returns `true` only if one was aborted.
    pub fn abort_singularity(&self, world: &dyn WorldHandle, state: &mut SingularityState) -> bool {
        self.transition(world, state, |t, ctx| t.abort_singularity(ctx))
    }

    /// Tear everything down. Only the first call does anything.
    ///
    /// Detaches the attached scenario whatever world it was attached for,
    /// shuts down the phase handlers, then the services (pending tasks are
    /// dropped unexecuted).
    pub fn shutdown(&self, world: &dyn WorldHandle) {
        let Some(from) = self.gate.begin_shutdown() else {
            debug!(world = %world.key(), "Shutdown already in progress or done");
            return;
        };
        info!(world = %world.key(), from = %from, "Orchestrator shutting down");
        let bus = self.services.bus();
        bus.post(&LifecycleChanged {
            from,
            to: OrchestratorState::ShuttingDown,
        });

        if let Some(detached) = self.scenarios().detach_active(bus.as_ref()) {
            debug!(scenario = %detached, "Scenario detached for shutdown");
        }
        self.phases().shutdown();
        self.services.shutdown();

        if let Err(actual) = self
            .gate
            .advance(OrchestratorState::ShuttingDown, OrchestratorState::Shutdown)
        {
            warn!(actual = %actual, "Shutdown finished from unexpected state");
        }
        self.singularity_active.store(false, Ordering::Release);
        info!(world = %world.key(), "Orchestrator shut down");
    }
}

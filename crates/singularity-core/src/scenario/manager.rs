//! Scenario manager: keeps exactly one scenario attached and ticks it.

use std::sync::{Arc, PoisonError};

use singularity_events::{EffectBus, EffectBusExt, isolate};
use singularity_types::{ScenarioId, WorldKey};
use tracing::{debug, error, info, warn};

use super::{Scenario, ScenarioError, ScenarioRegistry, SharedScenario};
use crate::effects::{ScenarioAttached, ScenarioDetached};
use crate::world::WorldHandle;

struct ActiveScenario {
    world: WorldKey,
    id: ScenarioId,
    scenario: SharedScenario,
}

/// Attaches, ticks and detaches scenarios resolved from a registry.
pub struct ScenarioManager {
    registry: Arc<ScenarioRegistry>,
    active: Option<ActiveScenario>,
}

/// Run one scenario hook with the instance locked, containing panics.
fn run_hook<R>(
    scenario: &SharedScenario,
    hook: impl FnOnce(&mut dyn Scenario) -> Result<R, ScenarioError>,
) -> Result<R, ScenarioError> {
    isolate::guarded(|| {
        let mut guard = scenario.lock().unwrap_or_else(PoisonError::into_inner);
        hook(&mut **guard)
    })
    .unwrap_or_else(|message| Err(ScenarioError::Panicked { message }))
}

impl ScenarioManager {
    /// Create a manager with nothing attached.
    pub const fn new(registry: Arc<ScenarioRegistry>) -> Self {
        Self {
            registry,
            active: None,
        }
    }

    /// The registry scenarios are resolved from.
    pub const fn registry(&self) -> &Arc<ScenarioRegistry> {
        &self.registry
    }

    /// Id of the attached scenario, if any.
    pub fn active_scenario_id(&self) -> Option<&ScenarioId> {
        self.active.as_ref().map(|active| &active.id)
    }

    /// World the attached scenario belongs to, if any.
    pub fn active_world(&self) -> Option<&WorldKey> {
        self.active.as_ref().map(|active| &active.world)
    }

    /// Make sure the right scenario is attached for `world` and return it.
    ///
    /// The registry decides which instance that is. When it hands out a
    /// different instance than the attached one (another world, or the
    /// binding changed), the attached scenario is detached first. If the
    /// attach hook fails the registry cache for the world is dropped and
    /// `None` is returned; the next tick tries again with a fresh instance.
    pub fn ensure(&mut self, world: &dyn WorldHandle, bus: &dyn EffectBus) -> Option<SharedScenario> {
        let key = world.key();
        let resolved = self.registry.resolve(key);
        let previous = match (&self.active, &resolved) {
            (Some(active), Some(current))
                if active.world == *key && Arc::ptr_eq(&active.scenario, current) =>
            {
                return resolved;
            }
            (Some(active), _) => Some(active.world.clone()),
            (None, _) => None,
        };
        if let Some(previous) = previous {
            self.detach(&previous, bus);
        }

        let scenario = resolved?;
        let id = scenario
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id()
            .clone();

        if let Err(err) = run_hook(&scenario, |scenario| scenario.on_attach(world)) {
            error!(world = %key, scenario = %id, error = %err, "Scenario attach failed");
            self.registry.invalidate(key);
            return None;
        }

        info!(world = %key, scenario = %id, "Scenario attached");
        self.active = Some(ActiveScenario {
            world: key.clone(),
            id: id.clone(),
            scenario: Arc::clone(&scenario),
        });
        bus.post(&ScenarioAttached {
            world: key.clone(),
            scenario: id,
        });
        Some(scenario)
    }

    /// Detach the active scenario if it belongs to `world`.
    ///
    /// The active reference is cleared before the detach hook runs, so a
    /// failing hook still leaves the manager detached. Returns the id of the
    /// detached scenario.
    pub fn detach(&mut self, world: &WorldKey, bus: &dyn EffectBus) -> Option<ScenarioId> {
        if self.active.as_ref().is_none_or(|active| active.world != *world) {
            return None;
        }
        self.release(bus).map(|(_, id)| id)
    }

    /// Detach whatever is attached, whichever world it belongs to, and drop
    /// the registry's cached instance for that world.
    ///
    /// Used for teardown: the detached instance can never be handed out and
    /// attached again.
    pub fn detach_active(&mut self, bus: &dyn EffectBus) -> Option<ScenarioId> {
        let (world, id) = self.release(bus)?;
        self.registry.invalidate(&world);
        Some(id)
    }

    fn release(&mut self, bus: &dyn EffectBus) -> Option<(WorldKey, ScenarioId)> {
        let ActiveScenario { world, id, scenario } = self.active.take()?;

        if let Err(err) = run_hook(&scenario, |scenario| scenario.on_detach(&world)) {
            warn!(world = %world, scenario = %id, error = %err, "Scenario detach hook failed");
        }
        info!(world = %world, scenario = %id, "Scenario detached");
        bus.post(&ScenarioDetached {
            world: world.clone(),
            scenario: id.clone(),
        });
        Some((world, id))
    }

    /// One scenario tick: ensure, `tick`, then `tick_infection`.
    ///
    /// A failure in any step ends scenario processing for this tick only.
    /// Returns whether both hooks completed.
    pub fn tick(&mut self, world: &dyn WorldHandle, singularity_active: bool, bus: &dyn EffectBus) -> bool {
        let Some(scenario) = self.ensure(world, bus) else {
            debug!(world = %world.key(), "No scenario attached");
            return false;
        };

        let result = run_hook(&scenario, |scenario| {
            scenario.tick(world)?;
            scenario.tick_infection(world, singularity_active)
        });
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!(world = %world.key(), error = %err, "Scenario tick failed");
                false
            }
        }
    }
}

impl core::fmt::Debug for ScenarioManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScenarioManager")
            .field("active_scenario", &self.active_scenario_id())
            .field("active_world", &self.active_world())
            .finish_non_exhaustive()
    }
}

//! Built-in scenarios.
//!
//! `calm` leaves the world alone. `infected` spreads an infection while a
//! singularity burns and lets it recede once the world is quiet again.

use singularity_core::scenario::{Scenario, ScenarioError, ScenarioRegistry};
use singularity_core::world::WorldHandle;
use singularity_types::{ScenarioId, WorldKey};
use tracing::{debug, info};

/// Id of [`CalmScenario`].
pub const CALM: &str = "calm";
/// Id of [`InfectedScenario`].
pub const INFECTED: &str = "infected";

/// Infection ceiling.
const MAX_INFECTION: u32 = 1_000;
/// Growth per tick while a singularity is active.
const INFECTION_GROWTH: u32 = 5;
/// Decay per tick while dormant.
const INFECTION_DECAY: u32 = 2;

/// A scenario that only counts the ticks it was attached for.
#[derive(Debug)]
pub struct CalmScenario {
    id: ScenarioId,
    ticks: u64,
}

impl CalmScenario {
    /// A fresh instance.
    pub fn new() -> Self {
        Self {
            id: ScenarioId::new(CALM),
            ticks: 0,
        }
    }
}

impl Default for CalmScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for CalmScenario {
    fn id(&self) -> &ScenarioId {
        &self.id
    }

    fn on_attach(&mut self, world: &dyn WorldHandle) -> Result<(), ScenarioError> {
        info!(world = %world.key(), "Calm scenario attached");
        Ok(())
    }

    fn tick(&mut self, _world: &dyn WorldHandle) -> Result<(), ScenarioError> {
        self.ticks = self.ticks.saturating_add(1);
        Ok(())
    }

    fn on_detach(&mut self, world: &WorldKey) -> Result<(), ScenarioError> {
        info!(world = %world, ticks = self.ticks, "Calm scenario detached");
        Ok(())
    }
}

/// A scenario whose infection level follows the singularity.
#[derive(Debug)]
pub struct InfectedScenario {
    id: ScenarioId,
    infection: u32,
    peak: u32,
}

impl InfectedScenario {
    /// A fresh, uninfected instance.
    pub fn new() -> Self {
        Self {
            id: ScenarioId::new(INFECTED),
            infection: 0,
            peak: 0,
        }
    }

    /// Current infection level, `0..=1000`.
    pub const fn infection(&self) -> u32 {
        self.infection
    }
}

impl Default for InfectedScenario {
    fn default() -> Self {
        Self::new()
    }
}

impl Scenario for InfectedScenario {
    fn id(&self) -> &ScenarioId {
        &self.id
    }

    fn on_attach(&mut self, world: &dyn WorldHandle) -> Result<(), ScenarioError> {
        info!(world = %world.key(), infection = self.infection, "Infected scenario attached");
        Ok(())
    }

    fn tick(&mut self, _world: &dyn WorldHandle) -> Result<(), ScenarioError> {
        Ok(())
    }

    fn tick_infection(&mut self, world: &dyn WorldHandle, singularity_active: bool) -> Result<(), ScenarioError> {
        let before = self.infection;
        self.infection = if singularity_active {
            self.infection.saturating_add(INFECTION_GROWTH).min(MAX_INFECTION)
        } else {
            self.infection.saturating_sub(INFECTION_DECAY)
        };
        self.peak = self.peak.max(self.infection);

        if before != self.infection && (self.infection == 0 || self.infection == MAX_INFECTION) {
            debug!(world = %world.key(), infection = self.infection, "Infection reached a bound");
        }
        Ok(())
    }

    fn on_detach(&mut self, world: &WorldKey) -> Result<(), ScenarioError> {
        info!(world = %world, infection = self.infection(), peak = self.peak, "Infected scenario detached");
        Ok(())
    }
}

/// Register the built-in scenarios. `calm` is registered first and so
/// becomes the default unless config says otherwise.
pub fn register_defaults(registry: &ScenarioRegistry) {
    registry.register(CALM, || -> Box<dyn Scenario> { Box::new(CalmScenario::new()) });
    registry.register(INFECTED, || -> Box<dyn Scenario> {
        Box::new(InfectedScenario::new())
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use singularity_core::world::SimWorld;

    use super::*;

    #[test]
    fn defaults_register_calm_first() {
        let registry = ScenarioRegistry::new();
        register_defaults(&registry);
        assert_eq!(registry.default_scenario(), Some(ScenarioId::new(CALM)));
        assert_eq!(registry.registered_scenario_ids().len(), 2);
    }

    #[test]
    fn bound_world_resolves_infected() {
        let registry = ScenarioRegistry::new();
        register_defaults(&registry);
        let world = WorldKey::new("nether");
        registry.bind(world.clone(), INFECTED).unwrap();

        let scenario = registry.resolve(&world).unwrap();
        let guard = scenario.lock().unwrap();
        assert_eq!(guard.id().as_str(), INFECTED);
    }

    #[test]
    fn infection_grows_while_active_and_decays_after() {
        let world = SimWorld::new("w");
        let mut scenario = InfectedScenario::new();
        for _ in 0..10 {
            scenario.tick_infection(&world, true).unwrap();
        }
        assert_eq!(scenario.infection(), 50);

        for _ in 0..5 {
            scenario.tick_infection(&world, false).unwrap();
        }
        assert_eq!(scenario.infection(), 40);
    }

    #[test]
    fn infection_is_bounded() {
        let world = SimWorld::new("w");
        let mut scenario = InfectedScenario::new();
        for _ in 0..300 {
            scenario.tick_infection(&world, true).unwrap();
        }
        assert_eq!(scenario.infection(), MAX_INFECTION);

        for _ in 0..1_000 {
            scenario.tick_infection(&world, false).unwrap();
        }
        assert_eq!(scenario.infection(), 0);
    }
}

//! Scenario registry: which scenario runs in which world.
//!
//! Resolution order for a world is: the cached instance, else the id bound
//! to the world, else the default id. The first id ever registered becomes
//! the default unless [`ScenarioRegistry::set_default`] picks another.
//! Instances are built lazily and cached per world; resolving again returns
//! the same instance until the cache entry is invalidated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard};

use singularity_events::isolate;
use singularity_types::{ScenarioId, WorldKey};
use tracing::{debug, error, info, warn};

use super::{ScenarioError, ScenarioFactory, SharedScenario};
use crate::config::ScenarioConfig;

#[derive(Default)]
struct RegistryInner {
    /// Registration order is preserved for listing.
    factories: Vec<(ScenarioId, Arc<dyn ScenarioFactory>)>,
    default: Option<ScenarioId>,
    bindings: HashMap<WorldKey, ScenarioId>,
    cache: HashMap<WorldKey, (ScenarioId, SharedScenario)>,
}

impl RegistryInner {
    fn factory(&self, id: &ScenarioId) -> Option<Arc<dyn ScenarioFactory>> {
        self.factories
            .iter()
            .find(|(registered, _)| registered == id)
            .map(|(_, factory)| Arc::clone(factory))
    }

    fn is_registered(&self, id: &ScenarioId) -> bool {
        self.factories.iter().any(|(registered, _)| registered == id)
    }
}

/// Thread-safe scenario registry.
#[derive(Default)]
pub struct ScenarioRegistry {
    inner: RwLock<RegistryInner>,
}

impl ScenarioRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<R>(&self, f: impl FnOnce(&RegistryInner) -> R) -> R {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a factory under `id`.
    ///
    /// Re-registering an id replaces its factory and drops every cached
    /// instance built from the old one.
    pub fn register(&self, id: impl Into<ScenarioId>, factory: impl ScenarioFactory + 'static) {
        let id = id.into();
        let factory: Arc<dyn ScenarioFactory> = Arc::new(factory);
        let mut inner = self.write();

        if let Some(slot) = inner
            .factories
            .iter_mut()
            .find(|(registered, _)| *registered == id)
        {
            slot.1 = factory;
            inner.cache.retain(|_, (cached, _)| *cached != id);
            info!(scenario = %id, "Scenario factory replaced");
            return;
        }

        if inner.default.is_none() {
            inner.default = Some(id.clone());
        }
        inner.factories.push((id.clone(), factory));
        info!(scenario = %id, "Scenario registered");
    }

    /// Bind `world` to a registered scenario.
    ///
    /// Fails without touching the existing binding if `id` is unknown.
    pub fn bind(
        &self,
        world: impl Into<WorldKey>,
        id: impl Into<ScenarioId>,
    ) -> Result<(), ScenarioError> {
        let world = world.into();
        let id = id.into();
        let mut inner = self.write();
        if !inner.is_registered(&id) {
            return Err(ScenarioError::UnknownScenario { id });
        }
        inner.cache.remove(&world);
        info!(world = %world, scenario = %id, "Scenario bound");
        inner.bindings.insert(world, id);
        Ok(())
    }

    /// Remove the binding and cached instance for `world`.
    pub fn unbind(&self, world: &WorldKey) -> Option<ScenarioId> {
        let mut inner = self.write();
        inner.cache.remove(world);
        inner.bindings.remove(world)
    }

    /// Drop the cached instance for `world`, forcing a fresh build next time.
    pub fn invalidate(&self, world: &WorldKey) {
        if self.write().cache.remove(world).is_some() {
            debug!(world = %world, "Scenario cache invalidated");
        }
    }

    /// Resolve the scenario instance for `world`, building it if needed.
    ///
    /// Returns `None` when no scenario is bound and there is no default,
    /// or when the factory panics.
    pub fn resolve(&self, world: &WorldKey) -> Option<SharedScenario> {
        let (id, factory) = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some((_, cached)) = inner.cache.get(world) {
                return Some(Arc::clone(cached));
            }
            let id = inner.bindings.get(world).or(inner.default.as_ref())?.clone();
            let Some(factory) = inner.factory(&id) else {
                warn!(world = %world, scenario = %id, "Bound scenario has no factory");
                return None;
            };
            (id, factory)
        };

        // The factory runs without the lock held so it may consult the
        // registry itself.
        let scenario = match isolate::guarded(|| factory.create()) {
            Ok(scenario) => scenario,
            Err(panic) => {
                error!(world = %world, scenario = %id, panic = %panic, "Scenario factory panicked");
                return None;
            }
        };

        let mut inner = self.write();
        let (_, shared) = inner
            .cache
            .entry(world.clone())
            .or_insert_with(|| (id.clone(), Arc::new(Mutex::new(scenario))));
        debug!(world = %world, scenario = %id, "Scenario resolved");
        Some(Arc::clone(shared))
    }

    /// Scenario explicitly bound to `world`, if any.
    pub fn binding(&self, world: &WorldKey) -> Option<ScenarioId> {
        self.read(|inner| inner.bindings.get(world).cloned())
    }

    /// Every registered id, in registration order.
    pub fn registered_scenario_ids(&self) -> Vec<ScenarioId> {
        self.read(|inner| inner.factories.iter().map(|(id, _)| id.clone()).collect())
    }

    /// Scenario used for worlds without a binding.
    pub fn default_scenario(&self) -> Option<ScenarioId> {
        self.read(|inner| inner.default.clone())
    }

    /// Make a registered scenario the default.
    pub fn set_default(&self, id: impl Into<ScenarioId>) -> Result<(), ScenarioError> {
        let id = id.into();
        let mut inner = self.write();
        if !inner.is_registered(&id) {
            return Err(ScenarioError::UnknownScenario { id });
        }
        // Unbound worlds were resolved through the old default.
        let bindings = &inner.bindings;
        let stale: Vec<WorldKey> = inner
            .cache
            .keys()
            .filter(|world| !bindings.contains_key(*world))
            .cloned()
            .collect();
        for world in stale {
            inner.cache.remove(&world);
        }
        info!(scenario = %id, "Default scenario set");
        inner.default = Some(id);
        Ok(())
    }

    /// Apply the default and bindings from configuration.
    ///
    /// Every scenario named in `config` must already be registered.
    pub fn apply_config(&self, config: &ScenarioConfig) -> Result<(), ScenarioError> {
        if let Some(default) = &config.default {
            self.set_default(default.as_str())?;
        }
        for (world, id) in &config.bindings {
            self.bind(world.as_str(), id.as_str())?;
        }
        Ok(())
    }
}

impl core::fmt::Debug for ScenarioRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScenarioRegistry")
            .field("scenarios", &self.registered_scenario_ids())
            .field("default", &self.default_scenario())
            .finish_non_exhaustive()
    }
}

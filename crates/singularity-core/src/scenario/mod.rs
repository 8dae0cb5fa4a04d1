//! Pluggable per-world behavior strategies.
//!
//! A [`Scenario`] decides what "normal" looks like in one world between
//! and during singularity cycles. Scenarios are produced by a
//! [`ScenarioFactory`] registered under a [`ScenarioId`]; the
//! [`ScenarioRegistry`] picks one per world and the [`ScenarioManager`]
//! drives the one that is currently attached.
//!
//! # Modules
//!
//! - [`registry`] -- Factories, per-world bindings and the instance cache.
//! - [`manager`] -- Attach/detach lifecycle and per-tick dispatch.

pub mod manager;
pub mod registry;

use std::sync::{Arc, Mutex};

use singularity_types::{ScenarioId, WorldKey};

use crate::world::WorldHandle;

pub use manager::ScenarioManager;
pub use registry::ScenarioRegistry;

/// A scenario instance shared between the registry cache and the manager.
pub type SharedScenario = Arc<Mutex<Box<dyn Scenario>>>;

/// Errors raised by scenarios and scenario selection.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    /// No factory is registered under the requested id.
    #[error("unknown scenario: {id}")]
    UnknownScenario {
        /// The id that was asked for.
        id: ScenarioId,
    },

    /// A scenario hook reported a failure.
    #[error("scenario {id} failed: {reason}")]
    Failed {
        /// The scenario that failed.
        id: ScenarioId,
        /// What went wrong.
        reason: String,
    },

    /// A scenario hook panicked.
    #[error("scenario hook panicked: {message}")]
    Panicked {
        /// The panic payload, rendered as text.
        message: String,
    },
}

impl ScenarioError {
    /// Shorthand for [`ScenarioError::Failed`].
    pub fn failed(id: &ScenarioId, reason: impl Into<String>) -> Self {
        Self::Failed {
            id: id.clone(),
            reason: reason.into(),
        }
    }
}

/// Per-world behavior strategy.
///
/// Every hook runs on the tick thread. Failures and panics are contained
/// by the [`ScenarioManager`]; a failing hook never takes the tick down.
pub trait Scenario: Send {
    /// Registered id of this scenario.
    fn id(&self) -> &ScenarioId;

    /// Called once when the scenario becomes active in `world`.
    fn on_attach(&mut self, _world: &dyn WorldHandle) -> Result<(), ScenarioError> {
        Ok(())
    }

    /// Called every tick while attached.
    fn tick(&mut self, world: &dyn WorldHandle) -> Result<(), ScenarioError>;

    /// Called every tick after [`Scenario::tick`] with whether a singularity
    /// is currently active.
    fn tick_infection(
        &mut self,
        _world: &dyn WorldHandle,
        _singularity_active: bool,
    ) -> Result<(), ScenarioError> {
        Ok(())
    }

    /// Called once when the scenario stops being active in `world`.
    fn on_detach(&mut self, _world: &WorldKey) -> Result<(), ScenarioError> {
        Ok(())
    }
}

/// Produces fresh scenario instances.
pub trait ScenarioFactory: Send + Sync {
    /// Build a new, unattached instance.
    fn create(&self) -> Box<dyn Scenario>;
}

impl<F> ScenarioFactory for F
where
    F: Fn() -> Box<dyn Scenario> + Send + Sync,
{
    fn create(&self) -> Box<dyn Scenario> {
        self()
    }
}

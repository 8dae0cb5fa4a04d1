//! The service hub: scheduler, broadcast and effect bus behind one door.
//!
//! Services are installed after construction, once the host has wired
//! them. Until then (and after shutdown) every accessor hands out the
//! matching null object, so callers never check for "not installed".

use std::sync::{Arc, PoisonError, RwLock};

use singularity_events::{EffectBus, NoopEffectBus, isolate};
use tracing::{debug, error};

use crate::broadcast::{BroadcastService, NoopBroadcast};
use crate::scheduler::{NoopScheduler, TaskScheduler, TickReport};
use crate::world::WorldHandle;

/// Holder for the lifecycle-bound services.
pub struct ServiceHub {
    scheduler: RwLock<Option<Arc<dyn TaskScheduler>>>,
    broadcast: RwLock<Option<Arc<dyn BroadcastService>>>,
    bus: RwLock<Option<Arc<dyn EffectBus>>>,
}

impl ServiceHub {
    /// Create a hub with nothing installed.
    pub const fn new() -> Self {
        Self {
            scheduler: RwLock::new(None),
            broadcast: RwLock::new(None),
            bus: RwLock::new(None),
        }
    }

    /// Create a hub with all three services installed.
    pub fn with_services(
        scheduler: Arc<dyn TaskScheduler>,
        broadcast: Arc<dyn BroadcastService>,
        bus: Arc<dyn EffectBus>,
    ) -> Self {
        let hub = Self::new();
        hub.install_scheduler(scheduler);
        hub.install_broadcast(broadcast);
        hub.install_bus(bus);
        hub
    }

    /// Install (or replace) the scheduler.
    pub fn install_scheduler(&self, scheduler: Arc<dyn TaskScheduler>) {
        *self.scheduler.write().unwrap_or_else(PoisonError::into_inner) = Some(scheduler);
    }

    /// Install (or replace) the broadcast service.
    pub fn install_broadcast(&self, broadcast: Arc<dyn BroadcastService>) {
        *self.broadcast.write().unwrap_or_else(PoisonError::into_inner) = Some(broadcast);
    }

    /// Install (or replace) the effect bus.
    pub fn install_bus(&self, bus: Arc<dyn EffectBus>) {
        *self.bus.write().unwrap_or_else(PoisonError::into_inner) = Some(bus);
    }

    /// The installed scheduler, or [`NoopScheduler`].
    pub fn scheduler(&self) -> Arc<dyn TaskScheduler> {
        self.scheduler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| Arc::new(NoopScheduler))
    }

    /// The installed broadcast service, or [`NoopBroadcast`].
    pub fn broadcast(&self) -> Arc<dyn BroadcastService> {
        self.broadcast
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| Arc::new(NoopBroadcast))
    }

    /// The installed effect bus, or [`NoopEffectBus`].
    pub fn bus(&self) -> Arc<dyn EffectBus> {
        self.bus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| Arc::new(NoopEffectBus))
    }

    /// Whether a real scheduler is installed.
    pub fn has_scheduler(&self) -> bool {
        self.scheduler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Advance the scheduler, then flush the broadcast service.
    pub fn tick(&self, world: &dyn WorldHandle) -> TickReport {
        let scheduler = self.scheduler();
        let report = match isolate::guarded(|| scheduler.tick()) {
            Ok(report) => report,
            Err(panic) => {
                error!(world = %world.key(), panic = %panic, "Scheduler tick panicked");
                TickReport::default()
            }
        };

        let broadcast = self.broadcast();
        let game_time = world.game_time();
        if let Err(panic) = isolate::guarded(|| broadcast.tick(game_time)) {
            error!(world = %world.key(), panic = %panic, "Broadcast tick panicked");
        }
        report
    }

    /// Clear pending tasks and uninstall every service.
    pub fn shutdown(&self) {
        let scheduler = self
            .scheduler
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let dropped = scheduler.map_or(0, |scheduler| scheduler.clear());

        if let Some(broadcast) = self
            .broadcast
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            && let Err(panic) = isolate::guarded(|| broadcast.shutdown())
        {
            error!(panic = %panic, "Broadcast shutdown panicked");
        }

        self.bus.write().unwrap_or_else(PoisonError::into_inner).take();
        debug!(dropped_tasks = dropped, "Service hub shut down");
    }
}

impl Default for ServiceHub {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ServiceHub {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ServiceHub")
            .field("has_scheduler", &self.has_scheduler())
            .finish_non_exhaustive()
    }
}

//! Per-call dependency bundle handed to phase handlers.

use std::sync::Arc;

use singularity_events::EffectBus;

use super::{PhaseError, PhaseTransitions};
use crate::broadcast::{Announcement, BroadcastService};
use crate::config::SingularityProfile;
use crate::scheduler::TaskScheduler;
use crate::services::ServiceHub;
use crate::state::SingularityState;
use crate::world::WorldHandle;

/// Everything a phase handler or transition may touch during one call.
///
/// Built fresh for each `tick_phases` or transition call, so handlers
/// always see the services that are installed right now.
pub struct PhaseContext<'a> {
    world: &'a dyn WorldHandle,
    state: &'a mut SingularityState,
    bus: Arc<dyn EffectBus>,
    scheduler: Arc<dyn TaskScheduler>,
    broadcast: Arc<dyn BroadcastService>,
    profile: &'a SingularityProfile,
    transitions: &'a PhaseTransitions,
}

impl<'a> PhaseContext<'a> {
    /// Bundle the current services with the caller's world and state.
    pub fn new(
        world: &'a dyn WorldHandle,
        state: &'a mut SingularityState,
        services: &ServiceHub,
        profile: &'a SingularityProfile,
        transitions: &'a PhaseTransitions,
    ) -> Self {
        Self {
            world,
            state,
            bus: services.bus(),
            scheduler: services.scheduler(),
            broadcast: services.broadcast(),
            profile,
            transitions,
        }
    }

    /// The world being ticked.
    pub fn world(&self) -> &'a dyn WorldHandle {
        self.world
    }

    /// The singularity state.
    pub fn state(&self) -> &SingularityState {
        self.state
    }

    /// Mutable singularity state. Handlers change flags and counters here;
    /// the phase itself only changes through the transition methods.
    pub fn state_mut(&mut self) -> &mut SingularityState {
        self.state
    }

    /// The effect bus.
    pub fn bus(&self) -> &dyn EffectBus {
        self.bus.as_ref()
    }

    /// The task scheduler.
    pub fn scheduler(&self) -> &dyn TaskScheduler {
        self.scheduler.as_ref()
    }

    /// The broadcast service.
    pub fn broadcast(&self) -> &dyn BroadcastService {
        self.broadcast.as_ref()
    }

    /// Phase durations and sizes.
    pub fn profile(&self) -> &'a SingularityProfile {
        self.profile
    }

    /// Queue an announcement for this world.
    pub fn announce(&self, message: impl Into<String>) {
        self.broadcast
            .announce(Announcement::new(self.world.key().as_str(), message));
    }

    /// See [`PhaseTransitions::begin_fusing`].
    pub fn begin_fusing(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.begin_fusing(self)
    }

    /// See [`PhaseTransitions::handle_fuse_countdown_complete`].
    pub fn handle_fuse_countdown_complete(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.handle_fuse_countdown_complete(self)
    }

    /// See [`PhaseTransitions::enter_core`].
    pub fn enter_core(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.enter_core(self)
    }

    /// See [`PhaseTransitions::enter_ring`].
    pub fn enter_ring(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.enter_ring(self)
    }

    /// See [`PhaseTransitions::begin_dissipation`].
    pub fn begin_dissipation(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.begin_dissipation(self)
    }

    /// See [`PhaseTransitions::start_post_collapse_reset`].
    pub fn start_post_collapse_reset(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.start_post_collapse_reset(self)
    }

    /// See [`PhaseTransitions::process_singularity_reset`].
    pub fn process_singularity_reset(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.process_singularity_reset(self)
    }

    /// See [`PhaseTransitions::finish_singularity`].
    pub fn finish_singularity(&mut self) -> Result<(), PhaseError> {
        let transitions = self.transitions;
        transitions.finish_singularity(self)
    }

    /// See [`PhaseTransitions::abort_singularity`].
    pub fn abort_singularity(&mut self) -> bool {
        let transitions = self.transitions;
        transitions.abort_singularity(self)
    }
}

impl core::fmt::Debug for PhaseContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PhaseContext")
            .field("world", self.world.key())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//! Tick-driven orchestration core for the Singularity simulation.
//!
//! One host tick drives everything: the [`Orchestrator`] advances the
//! deferred-task scheduler, flushes announcements, ticks the scenario
//! attached to the world, and runs the handler of the current singularity
//! phase. All collaborators are injected at composition time through
//! [`OrchestratorParts`]; missing services fall back to null objects.
//!
//! # Modules
//!
//! - [`broadcast`] -- Announcement queue flushed once per tick.
//! - [`config`] -- Configuration loading from `singularity-config.yaml`.
//! - [`effects`] -- Event types posted on the effect bus.
//! - [`lifecycle`] -- The forward-only orchestrator lifecycle gate.
//! - [`operator`] -- Pause, resume, speed and stop controls for the loop.
//! - [`orchestrator`] -- The composition root the host ticks.
//! - [`phase`] -- Phase handlers, guarded transitions, phase dispatch.
//! - [`runner`] -- The async tick loop.
//! - [`scenario`] -- Scenario registry and manager.
//! - [`scheduler`] -- Deferred and durable task execution.
//! - [`services`] -- The service hub.
//! - [`state`] -- Caller-owned singularity state.
//! - [`world`] -- The opaque world handle.
//!
//! [`Orchestrator`]: orchestrator::Orchestrator
//! [`OrchestratorParts`]: orchestrator::OrchestratorParts

pub mod broadcast;
pub mod config;
pub mod effects;
pub mod lifecycle;
pub mod operator;
pub mod orchestrator;
pub mod phase;
pub mod runner;
pub mod scenario;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod world;

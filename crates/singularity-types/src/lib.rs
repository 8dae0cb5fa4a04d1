//! Shared type definitions for the Singularity orchestration core.
//!
//! This crate is the single source of truth for the value types that cross
//! crate boundaries. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for dashboards that watch a running world.
//!
//! # Modules
//!
//! - [`ids`] -- Symbolic keys and generated identifiers
//! - [`enums`] -- Orchestrator lifecycle and singularity phases
//! - [`snapshot`] -- Durable projections of scheduler state

pub mod enums;
pub mod ids;
pub mod snapshot;

// Re-export all public types at crate root for convenience.
pub use enums::{OrchestratorState, Phase};
pub use ids::{ScenarioId, TaskId, WorldKey};
pub use snapshot::{PayloadError, SchedulerSnapshot, TaskPayload, TaskSnapshot};

//! Type-keyed effect bus for the Singularity orchestration core.
//!
//! Domain code never calls its consumers directly. It posts plain values
//! (a phase changed, a scenario attached) on an [`EffectBus`], and whoever
//! cares registers a listener for that value's type. The bus decouples the
//! orchestration core from rendering, sound, and persistence layers that
//! live outside it.
//!
//! # Modules
//!
//! - [`bus`] -- [`EffectBus`], [`EffectBusExt`], [`TypedEffectBus`] and the
//!   inert [`NoopEffectBus`].
//! - [`isolate`] -- Panic isolation used at every callback boundary.

pub mod bus;
pub mod isolate;

pub use bus::{EffectBus, EffectBusExt, ListenerHandle, NoopEffectBus, TypedEffectBus};

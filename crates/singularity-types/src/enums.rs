//! Enumeration types for the Singularity orchestration core.
//!
//! Two independent state machines live here: the orchestrator's own
//! lifecycle ([`OrchestratorState`]) and the staged event it governs
//! ([`Phase`]). They never share transitions.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Orchestrator lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of an orchestrator.
///
/// Strictly forward-moving:
/// `Initializing -> Running -> ShuttingDown -> Shutdown`. Only `Running`
/// permits ticking; `Shutdown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
#[repr(u8)]
pub enum OrchestratorState {
    /// Collaborators are being composed.
    Initializing = 0,
    /// Ticks are processed.
    Running = 1,
    /// Teardown is in progress.
    ShuttingDown = 2,
    /// Teardown finished.
    Shutdown = 3,
}

impl OrchestratorState {
    /// Decode the raw discriminant stored in an atomic.
    ///
    /// Unknown values decode to [`OrchestratorState::Shutdown`] so a corrupt
    /// gate never permits a tick.
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Initializing,
            1 => Self::Running,
            2 => Self::ShuttingDown,
            _ => Self::Shutdown,
        }
    }

    /// Raw discriminant, for storage in an atomic.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether teardown has started or finished.
    pub const fn is_terminating(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Shutdown)
    }
}

impl core::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Shutdown => "shutdown",
        };
        f.write_str(label)
    }
}

// ---------------------------------------------------------------------------
// Singularity phases
// ---------------------------------------------------------------------------

/// One of the seven mutually exclusive stages of a singularity event.
///
/// The nominal progression is
/// `Dormant -> Fusing -> Collapse -> Core -> Ring -> Dissipation -> Reset -> Dormant`,
/// with an abort path from any non-dormant phase back to `Dormant`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export, export_to = "bindings/")]
pub enum Phase {
    /// Nothing is happening.
    #[default]
    Dormant,
    /// The fuse is burning down toward collapse.
    Fusing,
    /// Matter is being pulled inward.
    Collapse,
    /// The collapsed core is stable.
    Core,
    /// An accretion ring forms around the core.
    Ring,
    /// The ring disperses.
    Dissipation,
    /// The affected region is restored, batch by batch.
    Reset,
}

impl Phase {
    /// Every phase, in nominal progression order.
    pub const ALL: [Self; 7] = [
        Self::Dormant,
        Self::Fusing,
        Self::Collapse,
        Self::Core,
        Self::Ring,
        Self::Dissipation,
        Self::Reset,
    ];

    /// Whether the collapse has happened and the region needs a reset
    /// before the cycle can finish.
    pub const fn is_post_collapse(self) -> bool {
        matches!(
            self,
            Self::Collapse | Self::Core | Self::Ring | Self::Dissipation
        )
    }
}

impl core::fmt::Display for Phase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            Self::Dormant => "dormant",
            Self::Fusing => "fusing",
            Self::Collapse => "collapse",
            Self::Core => "core",
            Self::Ring => "ring",
            Self::Dissipation => "dissipation",
            Self::Reset => "reset",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_round_trips_through_u8() {
        for state in [
            OrchestratorState::Initializing,
            OrchestratorState::Running,
            OrchestratorState::ShuttingDown,
            OrchestratorState::Shutdown,
        ] {
            assert_eq!(OrchestratorState::from_u8(state.as_u8()), state);
        }
        assert_eq!(OrchestratorState::from_u8(200), OrchestratorState::Shutdown);
    }

    #[test]
    fn lifecycle_order_is_forward() {
        assert!(OrchestratorState::Initializing < OrchestratorState::Running);
        assert!(OrchestratorState::Running < OrchestratorState::ShuttingDown);
        assert!(OrchestratorState::ShuttingDown < OrchestratorState::Shutdown);
    }

    #[test]
    fn post_collapse_phases() {
        assert!(!Phase::Dormant.is_post_collapse());
        assert!(!Phase::Fusing.is_post_collapse());
        assert!(Phase::Collapse.is_post_collapse());
        assert!(Phase::Dissipation.is_post_collapse());
        assert!(!Phase::Reset.is_post_collapse());
    }

    #[test]
    fn default_phase_is_dormant() {
        assert_eq!(Phase::default(), Phase::Dormant);
        assert_eq!(Phase::ALL.len(), 7);
    }
}

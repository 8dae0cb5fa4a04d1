//! The world handle passed into every orchestration call.
//!
//! The core never looks inside a world. It reads the key (to pick a
//! scenario and to cache it) and the game time (for logs and snapshots),
//! and forwards the handle to scenarios and phase handlers untouched.

use singularity_types::WorldKey;

/// Opaque identity and capability object for one world.
pub trait WorldHandle: Send + Sync {
    /// Stable identity used as a registry and cache key.
    fn key(&self) -> &WorldKey;

    /// Current game time in ticks.
    fn game_time(&self) -> u64;
}

/// Minimal in-process world: a key and a tick counter.
///
/// Used by the engine binary and by tests. Hosts that embed the core
/// implement [`WorldHandle`] on their own world type instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimWorld {
    key: WorldKey,
    game_time: u64,
}

impl SimWorld {
    /// Create a world at game time 0.
    pub fn new(key: impl Into<WorldKey>) -> Self {
        Self {
            key: key.into(),
            game_time: 0,
        }
    }

    /// Create a world at a given game time.
    pub fn at(key: impl Into<WorldKey>, game_time: u64) -> Self {
        Self {
            key: key.into(),
            game_time,
        }
    }

    /// Advance the game time by one tick, saturating at `u64::MAX`.
    pub const fn advance(&mut self) -> u64 {
        self.game_time = self.game_time.saturating_add(1);
        self.game_time
    }
}

impl WorldHandle for SimWorld {
    fn key(&self) -> &WorldKey {
        &self.key
    }

    fn game_time(&self) -> u64 {
        self.game_time
    }
}

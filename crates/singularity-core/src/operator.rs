//! Operator control state for the tick loop.
//!
//! Shared atomic state read by [`run_simulation`] on every iteration and
//! written by whoever controls the process (the ctrl-c watcher in the
//! engine binary, tests, an embedding host). The operator can pause and
//! resume, change tick speed, and request a clean stop without locks on
//! the hot path.
//!
//! [`run_simulation`]: crate::runner::run_simulation

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};

/// Smallest tick interval an operator may set at runtime.
pub const MIN_TICK_INTERVAL_MS: u64 = 10;

/// Reason why the tick loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationEndReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// An operator issued a stop command.
    OperatorStop,
    /// The orchestrator was shut down from elsewhere.
    OrchestratorShutdown,
}

/// Shared operator control state.
#[derive(Debug)]
pub struct OperatorState {
    /// Whether the loop is currently paused.
    paused: AtomicBool,

    /// Wakes the loop when resumed.
    resume_notify: Notify,

    /// Whether a stop has been requested.
    stop_requested: AtomicBool,

    /// Current tick interval in milliseconds (runtime-adjustable).
    tick_interval_ms: AtomicU64,

    /// Maximum number of ticks (0 = unlimited).
    max_ticks: u64,

    /// Reason the loop ended, if it has.
    end_reason: Mutex<Option<SimulationEndReason>>,
}

impl OperatorState {
    /// Create operator state for a loop ticking every `tick_interval_ms`
    /// and stopping after `max_ticks` (0 = never).
    pub fn new(tick_interval_ms: u64, max_ticks: u64) -> Self {
        Self {
            paused: AtomicBool::new(false),
            resume_notify: Notify::new(),
            stop_requested: AtomicBool::new(false),
            tick_interval_ms: AtomicU64::new(tick_interval_ms),
            max_ticks,
            end_reason: Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether the loop is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause the loop. It sleeps until resumed.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Resume the loop and wake it.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.resume_notify.notify_one();
    }

    /// Wait until the loop is no longer paused.
    pub async fn wait_if_paused(&self) {
        while self.paused.load(Ordering::Acquire) {
            self.resume_notify.notified().await;
        }
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request a clean stop. Also wakes a paused loop so it can exit.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.resume();
    }

    /// Check whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Record the reason the loop ended.
    pub async fn set_end_reason(&self, reason: SimulationEndReason) {
        *self.end_reason.lock().await = Some(reason);
    }

    /// The reason the loop ended, if it has.
    pub async fn end_reason(&self) -> Option<SimulationEndReason> {
        *self.end_reason.lock().await
    }

    // -----------------------------------------------------------------------
    // Tick speed and limits
    // -----------------------------------------------------------------------

    /// Current tick interval in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Acquire)
    }

    /// Set the tick interval. Values below [`MIN_TICK_INTERVAL_MS`] are
    /// rejected with `None`; otherwise the previous interval is returned.
    pub fn set_tick_interval_ms(&self, ms: u64) -> Option<u64> {
        if ms < MIN_TICK_INTERVAL_MS {
            return None;
        }
        Some(self.tick_interval_ms.swap(ms, Ordering::AcqRel))
    }

    /// Whether `ticks_run` has reached the limit. Always `false` when the
    /// limit is 0.
    pub const fn tick_limit_reached(&self, ticks_run: u64) -> bool {
        self.max_ticks > 0 && ticks_run >= self.max_ticks
    }

    /// The configured tick limit.
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unpaused_and_unstopped() {
        let state = OperatorState::new(50, 0);
        assert!(!state.is_paused());
        assert!(!state.is_stop_requested());
    }

    #[test]
    fn pause_and_resume() {
        let state = OperatorState::new(50, 0);
        state.pause();
        assert!(state.is_paused());
        state.resume();
        assert!(!state.is_paused());
    }

    #[test]
    fn stop_unpauses() {
        let state = OperatorState::new(50, 0);
        state.pause();
        state.request_stop();
        assert!(state.is_stop_requested());
        assert!(!state.is_paused());
    }

    #[test]
    fn tick_interval_has_a_floor() {
        let state = OperatorState::new(50, 0);
        assert_eq!(state.set_tick_interval_ms(5), None);
        assert_eq!(state.set_tick_interval_ms(20), Some(50));
        assert_eq!(state.tick_interval_ms(), 20);
    }

    #[test]
    fn zero_tick_limit_is_unlimited() {
        assert!(!OperatorState::new(50, 0).tick_limit_reached(u64::MAX));
        let bounded = OperatorState::new(50, 10);
        assert!(!bounded.tick_limit_reached(9));
        assert!(bounded.tick_limit_reached(10));
    }

    #[tokio::test]
    async fn end_reason_is_recorded() {
        let state = OperatorState::new(50, 0);
        assert_eq!(state.end_reason().await, None);
        state.set_end_reason(SimulationEndReason::OperatorStop).await;
        assert_eq!(
            state.end_reason().await,
            Some(SimulationEndReason::OperatorStop)
        );
    }

    #[tokio::test]
    async fn resume_wakes_a_waiting_loop() {
        let state = std::sync::Arc::new(OperatorState::new(50, 0));
        state.pause();
        let waiter = std::sync::Arc::clone(&state);
        let task = tokio::spawn(async move { waiter.wait_if_paused().await });
        tokio::task::yield_now().await;
        state.resume();
        assert!(task.await.is_ok());
    }
}

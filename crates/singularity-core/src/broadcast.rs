//! Broadcast service: player-facing announcements.
//!
//! Announcements are queued as they are raised during a tick and flushed
//! once per tick to every subscriber of a [`tokio::sync::broadcast`]
//! channel. Network or chat layers subscribe with
//! [`ChannelBroadcast::subscribe`]; the core never knows who is listening.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the announcement channel.
///
/// A subscriber that falls behind by more than this many messages receives
/// [`broadcast::error::RecvError::Lagged`] and skips to the newest message.
const BROADCAST_CAPACITY: usize = 256;

/// A message for everyone in a world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Key of the world the message concerns.
    pub world: String,
    /// Human-readable text.
    pub message: String,
}

impl Announcement {
    /// Create an announcement for a world.
    pub fn new(world: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            world: world.into(),
            message: message.into(),
        }
    }
}

/// Announcement sink ticked by the service hub.
pub trait BroadcastService: Send + Sync {
    /// Queue an announcement for the next flush.
    fn announce(&self, announcement: Announcement);

    /// Flush queued announcements. Returns how many were sent.
    fn tick(&self, game_time: u64) -> usize;

    /// Drop anything queued and stop accepting announcements.
    fn shutdown(&self);
}

/// Broadcast service backed by a tokio broadcast channel.
#[derive(Debug)]
pub struct ChannelBroadcast {
    tx: broadcast::Sender<Announcement>,
    pending: Mutex<Option<Vec<Announcement>>>,
}

impl ChannelBroadcast {
    /// Create a service with an empty queue.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            tx,
            pending: Mutex::new(Some(Vec::new())),
        }
    }

    /// Subscribe to flushed announcements.
    pub fn subscribe(&self) -> broadcast::Receiver<Announcement> {
        self.tx.subscribe()
    }

    /// Number of announcements waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Vec::len)
    }
}

impl Default for ChannelBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastService for ChannelBroadcast {
    fn announce(&self, announcement: Announcement) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.as_mut() {
            Some(queue) => queue.push(announcement),
            None => debug!(message = %announcement.message, "Broadcast shut down, announcement dropped"),
        }
    }

    fn tick(&self, game_time: u64) -> usize {
        let batch = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            match pending.as_mut() {
                Some(queue) => std::mem::take(queue),
                None => return 0,
            }
        };

        let count = batch.len();
        for announcement in batch {
            // A send with no receivers is not an error: nobody is listening.
            let receivers = self.tx.send(announcement).unwrap_or(0);
            debug!(game_time, receivers, "Announcement broadcast");
        }
        count
    }

    fn shutdown(&self) {
        let dropped = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map_or(0, |queue| queue.len());
        debug!(dropped, "Broadcast service shut down");
    }
}

/// Inert broadcast service used before a real one is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBroadcast;

impl BroadcastService for NoopBroadcast {
    fn announce(&self, _announcement: Announcement) {}

    fn tick(&self, _game_time: u64) -> usize {
        0
    }

    fn shutdown(&self) {}
}

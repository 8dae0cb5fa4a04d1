//! Persisted task types the engine registers at boot.

use std::sync::Arc;

use singularity_core::broadcast::{Announcement, BroadcastService};
use singularity_core::scheduler::{FnTaskFactory, PersistedTask, TaskError, TaskTypeRegistry};
use singularity_types::TaskPayload;
use tracing::warn;

/// Type key of [`AnnounceTask`].
pub const ANNOUNCE: &str = "announce";

/// Raises an announcement when it fires. Survives restarts.
pub struct AnnounceTask {
    announcement: Announcement,
    broadcast: Arc<dyn BroadcastService>,
}

impl AnnounceTask {
    /// Boxed, ready for `schedule_persisted`.
    pub fn boxed(announcement: Announcement, broadcast: Arc<dyn BroadcastService>) -> Box<dyn PersistedTask> {
        Box::new(Self {
            announcement,
            broadcast,
        })
    }
}

impl PersistedTask for AnnounceTask {
    fn type_key(&self) -> &str {
        ANNOUNCE
    }

    fn save(&self) -> Result<TaskPayload, TaskError> {
        Ok(TaskPayload::encode(&self.announcement)?)
    }

    fn run(self: Box<Self>) -> Result<(), TaskError> {
        let Self {
            announcement,
            broadcast,
        } = *self;
        broadcast.announce(announcement);
        Ok(())
    }
}

/// Register every engine task type, bound to `broadcast`.
pub fn register_all(registry: &TaskTypeRegistry, broadcast: &Arc<dyn BroadcastService>) {
    let broadcast = Arc::clone(broadcast);
    registry.register(Arc::new(FnTaskFactory::new(
        ANNOUNCE,
        move |payload: &TaskPayload| -> Option<Box<dyn PersistedTask>> {
            match payload.decode::<Announcement>() {
                Ok(announcement) => Some(AnnounceTask::boxed(announcement, Arc::clone(&broadcast))),
                Err(e) => {
                    warn!(error = %e, "Unreadable announce payload");
                    None
                }
            }
        },
    )));
}

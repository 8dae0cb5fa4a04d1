//! Serializable projections of scheduler state.
//!
//! A [`TaskSnapshot`] is the durable form of one queued task. The payload
//! inside it is an opaque byte buffer: only the task type that produced it
//! knows how to read it back. [`TaskPayload::encode`] and
//! [`TaskPayload::decode`] are provided for task types that are happy to
//! store a JSON document.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::TaskId;

/// Errors raised while encoding or decoding a [`TaskPayload`].
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The value could not be converted to or from JSON.
    #[error("payload codec error: {source}")]
    Codec {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },
}

/// Opaque serialized state of a persisted task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(transparent)]
#[ts(export, export_to = "bindings/")]
pub struct TaskPayload(Vec<u8>);

impl TaskPayload {
    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// An empty payload, for task types that carry no state.
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Whether the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode a value as a JSON payload.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, PayloadError> {
        Ok(Self(serde_json::to_vec(value)?))
    }

    /// Decode a JSON payload produced by [`TaskPayload::encode`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        Ok(serde_json::from_slice(&self.0)?)
    }
}

/// Immutable projection of one persistable scheduled task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaskSnapshot {
    /// The task's identifier, kept across restarts.
    pub id: TaskId,
    /// Registered task type used to find the factory on restore.
    pub type_key: String,
    /// Ticks left before the task fires.
    pub remaining_ticks: u64,
    /// Type-specific state.
    pub payload: TaskPayload,
}

/// Envelope written to disk when the scheduler is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SchedulerSnapshot {
    /// Wall-clock time the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// World game time at the moment of the snapshot.
    pub game_time: u64,
    /// Persistable tasks in queue order.
    pub tasks: Vec<TaskSnapshot>,
}

impl SchedulerSnapshot {
    /// Build an envelope stamped with the current wall-clock time.
    pub fn now(game_time: u64, tasks: Vec<TaskSnapshot>) -> Self {
        Self {
            taken_at: Utc::now(),
            game_time,
            tasks,
        }
    }
}

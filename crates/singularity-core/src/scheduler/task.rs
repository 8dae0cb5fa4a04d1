//! Persisted task contracts and the task type registry.
//!
//! A transient task is just a closure and dies with the process. A
//! [`PersistedTask`] can additionally write its state to a [`TaskPayload`];
//! on restart the scheduler looks its `type_key` up in the
//! [`TaskTypeRegistry`] and asks the matching [`TaskFactory`] to rebuild it.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use singularity_types::{PayloadError, TaskPayload};

/// Errors raised by scheduled work.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task ran and reported a failure.
    #[error("task failed: {reason}")]
    Failed {
        /// Description of the failure.
        reason: String,
    },

    /// The task could not encode or decode its payload.
    #[error("task payload error: {source}")]
    Payload {
        /// The underlying payload error.
        #[from]
        source: PayloadError,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// A scheduled unit of work that can survive a restart.
pub trait PersistedTask: Send {
    /// Registered type name, used to find the factory on restore.
    fn type_key(&self) -> &str;

    /// Serialize the task's state.
    fn save(&self) -> Result<TaskPayload, TaskError>;

    /// Perform the work. Consumes the task.
    fn run(self: Box<Self>) -> Result<(), TaskError>;
}

/// Rebuilds persisted tasks of one type from their payloads.
pub trait TaskFactory: Send + Sync {
    /// The type name this factory handles.
    fn type_key(&self) -> &str;

    /// Rebuild a task. Returns `None` if the payload is not recognized.
    fn create(&self, payload: &TaskPayload) -> Option<Box<dyn PersistedTask>>;
}

/// [`TaskFactory`] backed by a closure.
pub struct FnTaskFactory<F> {
    type_key: String,
    create: F,
}

impl<F> FnTaskFactory<F>
where
    F: Fn(&TaskPayload) -> Option<Box<dyn PersistedTask>> + Send + Sync,
{
    /// Create a factory for `type_key`.
    pub fn new(type_key: impl Into<String>, create: F) -> Self {
        Self {
            type_key: type_key.into(),
            create,
        }
    }
}

impl<F> TaskFactory for FnTaskFactory<F>
where
    F: Fn(&TaskPayload) -> Option<Box<dyn PersistedTask>> + Send + Sync,
{
    fn type_key(&self) -> &str {
        &self.type_key
    }

    fn create(&self, payload: &TaskPayload) -> Option<Box<dyn PersistedTask>> {
        (self.create)(payload)
    }
}

/// Maps persisted task type names to their factories.
///
/// Every persisted type must be registered before a snapshot referencing
/// it is loaded. Registering the same type twice replaces the factory.
#[derive(Default)]
pub struct TaskTypeRegistry {
    factories: RwLock<BTreeMap<String, Arc<dyn TaskFactory>>>,
}

impl TaskTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own type key.
    pub fn register(&self, factory: Arc<dyn TaskFactory>) {
        let key = factory.type_key().to_owned();
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, factory);
    }

    /// Look up the factory for a type.
    pub fn factory(&self, type_key: &str) -> Option<Arc<dyn TaskFactory>> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_key)
            .cloned()
    }

    /// Whether a type is registered.
    pub fn contains(&self, type_key: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(type_key)
    }

    /// Registered type names, sorted.
    pub fn type_keys(&self) -> Vec<String> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl core::fmt::Debug for TaskTypeRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskTypeRegistry")
            .field("type_keys", &self.type_keys())
            .finish()
    }
}

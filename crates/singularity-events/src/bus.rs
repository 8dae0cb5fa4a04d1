//! The effect bus: synchronous, type-keyed publish/subscribe.
//!
//! Producers post plain Rust values; every listener registered for that
//! value's concrete type is invoked in the posting thread. The listener
//! table is keyed by [`TypeId`] and guarded by a [`RwLock`]. Delivery works
//! on a copy of the listener list taken under the read lock, so listeners
//! may register or unregister (themselves included) while an event is in
//! flight without deadlocking.
//!
//! Each listener is isolated: a panicking listener is logged and the
//! remaining listeners for the same event still run.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::isolate;

/// Type-erased listener body.
type ErasedListener = dyn Fn(&dyn Any) + Send + Sync;

/// A registered listener.
///
/// Returned by [`EffectBusExt::register`] and used to unregister. Clones
/// refer to the same listener; two separate registrations of the same
/// closure produce two distinct handles.
#[derive(Clone)]
pub struct ListenerHandle {
    event_type: TypeId,
    type_name: &'static str,
    listener: Arc<ErasedListener>,
}

impl ListenerHandle {
    /// Wrap a typed handler into a type-erased listener for `E`.
    pub fn new<E, F>(handler: F) -> Self
    where
        E: Any,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let listener = move |event: &dyn Any| {
            if let Some(event) = event.downcast_ref::<E>() {
                handler(event);
            }
        };
        Self {
            event_type: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            listener: Arc::new(listener),
        }
    }

    /// The event type this listener is registered for.
    pub const fn event_type(&self) -> TypeId {
        self.event_type
    }

    /// Human-readable name of the event type, for logs.
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether two handles refer to the same registration.
    pub fn same_listener(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.listener, &other.listener)
    }

    fn invoke(&self, event: &dyn Any) {
        (self.listener)(event);
    }
}

impl core::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("event_type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Object-safe core of an effect bus.
///
/// Most callers use the typed methods of [`EffectBusExt`] instead, which is
/// implemented for every bus, including `dyn EffectBus`.
pub trait EffectBus: Send + Sync {
    /// Add a listener to its event type's subscriber list.
    fn register_listener(&self, handle: ListenerHandle);

    /// Remove the first subscription matching `handle`.
    ///
    /// Returns `true` if a subscription was removed.
    fn unregister_listener(&self, handle: &ListenerHandle) -> bool;

    /// Deliver an event to every listener of `event_type`.
    ///
    /// Returns the number of listeners that completed without panicking.
    fn dispatch(&self, event_type: TypeId, type_name: &'static str, event: &dyn Any) -> usize;

    /// Number of listeners currently registered for `event_type`.
    fn listener_count_for(&self, event_type: TypeId) -> usize;

    /// Number of event types with at least one listener.
    fn event_type_count(&self) -> usize;
}

/// Typed convenience layer over [`EffectBus`].
pub trait EffectBusExt: EffectBus {
    /// Register a handler for events of type `E`.
    ///
    /// Registering the same closure twice yields two deliveries per event.
    fn register<E, F>(&self, handler: F) -> ListenerHandle
    where
        E: Any,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let handle = ListenerHandle::new::<E, F>(handler);
        self.register_listener(handle.clone());
        handle
    }

    /// Remove a previously registered handler.
    fn unregister(&self, handle: &ListenerHandle) -> bool {
        self.unregister_listener(handle)
    }

    /// Post an event to every handler registered for its concrete type.
    fn post<E: Any>(&self, event: &E) -> usize {
        self.dispatch(TypeId::of::<E>(), std::any::type_name::<E>(), event)
    }

    /// Number of handlers registered for `E`.
    fn listener_count<E: Any>(&self) -> usize {
        self.listener_count_for(TypeId::of::<E>())
    }
}

impl<B: EffectBus + ?Sized> EffectBusExt for B {}

/// The real effect bus.
#[derive(Debug, Default)]
pub struct TypedEffectBus {
    listeners: RwLock<HashMap<TypeId, Vec<ListenerHandle>>>,
}

impl TypedEffectBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EffectBus for TypedEffectBus {
    fn register_listener(&self, handle: ListenerHandle) {
        let mut table = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        debug!(event_type = handle.type_name(), "Listener registered");
        table.entry(handle.event_type()).or_default().push(handle);
    }

    fn unregister_listener(&self, handle: &ListenerHandle) -> bool {
        let mut table = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(subscribers) = table.get_mut(&handle.event_type()) else {
            return false;
        };
        let Some(position) = subscribers.iter().position(|h| h.same_listener(handle)) else {
            return false;
        };
        subscribers.remove(position);
        if subscribers.is_empty() {
            table.remove(&handle.event_type());
        }
        debug!(event_type = handle.type_name(), "Listener unregistered");
        true
    }

    fn dispatch(&self, event_type: TypeId, type_name: &'static str, event: &dyn Any) -> usize {
        let subscribers = {
            let table = self
                .listeners
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            match table.get(&event_type) {
                Some(list) => list.clone(),
                None => return 0,
            }
        };

        let mut delivered: usize = 0;
        for subscriber in &subscribers {
            match isolate::guarded(|| subscriber.invoke(event)) {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(message) => {
                    error!(event_type = type_name, panic = %message, "Effect listener panicked");
                }
            }
        }
        delivered
    }

    fn listener_count_for(&self, event_type: TypeId) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    fn event_type_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Inert bus used before a real one is installed.
///
/// Registration is accepted and forgotten; posts reach nobody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEffectBus;

impl EffectBus for NoopEffectBus {
    fn register_listener(&self, _handle: ListenerHandle) {}

    fn unregister_listener(&self, _handle: &ListenerHandle) -> bool {
        false
    }

    fn dispatch(&self, _event_type: TypeId, _type_name: &'static str, _event: &dyn Any) -> usize {
        0
    }

    fn listener_count_for(&self, _event_type: TypeId) -> usize {
        0
    }

    fn event_type_count(&self) -> usize {
        0
    }
}

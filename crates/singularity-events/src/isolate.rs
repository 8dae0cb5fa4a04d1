//! Panic isolation for callbacks supplied by code outside the core.
//!
//! Listeners, scheduled work, scenario hooks and phase handlers are all
//! written by someone else. A panic in one of them must never unwind
//! through the tick loop, so every call site routes through [`guarded`].

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Run `f`, converting a panic into `Err` carrying the panic message.
///
/// The closure is asserted unwind-safe: callers only hand in state that is
/// either discarded or re-validated after a failure.
pub fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

//! Identifier types shared across the Singularity workspace.
//!
//! Two families of identifier exist:
//!
//! - **Symbolic keys** ([`WorldKey`], [`ScenarioId`]) are human-readable
//!   names such as `minecraft:overworld` or `infected`. They come from
//!   configuration and from the host world, so they wrap a [`String`].
//! - **Generated ids** ([`TaskId`]) are UUID v7 values minted by the core.
//!   They survive snapshot round trips, which keeps a task traceable in the
//!   logs across a restart.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

/// Generates a newtype wrapper around a symbolic [`String`] name.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(String);

        impl $name {
            /// Create a key from any string-like value.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Borrow the symbolic name.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }
    };
}

define_key! {
    /// Identity of a world (dimension) handle, e.g. `minecraft:overworld`.
    ///
    /// The core uses it only as a registry and cache key.
    WorldKey
}

define_key! {
    /// Symbolic name of a registered scenario, e.g. `infected`.
    ScenarioId
}

define_id! {
    /// Unique identifier for a task held by the scheduler.
    TaskId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn keys_compare_by_name() {
        let a = WorldKey::new("minecraft:overworld");
        let b = WorldKey::from("minecraft:overworld");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "minecraft:overworld");
        assert_eq!(a.to_string(), "minecraft:overworld");
    }

    #[test]
    fn keys_serialize_as_plain_strings() {
        let id = ScenarioId::new("infected");
        let json = serde_json::to_string(&id);
        assert_eq!(json.ok().as_deref(), Some("\"infected\""));
    }
}

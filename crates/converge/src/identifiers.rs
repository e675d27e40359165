//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct
//! newtype wrapping a primitive. This prevents accidentally interchanging,
//! for example, a [`ServiceName`] with a [`RouteName`] even though both are
//! `String` under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and a
// From<&'static str> for compile-time-known names.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&'static str> for $name {
            fn from(value: &'static str) -> Self {
                debug_assert!(!value.is_empty());
                Self(value.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single convergence run (one invocation of the binary).
///
/// Generated fresh for every run; propagated through spans and the final
/// report so all activity from a single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RunId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed (configuration / gateway names)
// ---------------------------------------------------------------------------

string_id! {
    /// A container network name (e.g. `"gateway-net"`).
    NetworkName
}

string_id! {
    /// Identifies a gateway service by the name the operator declared for it.
    ///
    /// The control plane additionally assigns a server-side id on creation;
    /// see `GatewayId` for how the two relate.
    ServiceName
}

string_id! {
    /// Identifies a route attached to a gateway service.
    RouteName
}

string_id! {
    /// Identifies a gateway plugin by its registry name (e.g. `"rate-limiting"`).
    PluginName
}

string_id! {
    /// Identifies a pipeline step within one run.
    ///
    /// Step names are unique per pipeline; later steps reference earlier
    /// results by this name.
    StepName
}

string_id! {
    /// A file-system path relative to the artifact root.
    ///
    /// Used to identify the configuration, stack, and secret artifacts the
    /// run converges.
    ArtifactPath
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_are_rejected() {
        assert!(NetworkName::new("").is_none());
        assert!(ServiceName::new("httpbin").is_some());
    }

    #[test]
    fn display_matches_inner_value() {
        let name = StepName::from("create-service");
        assert_eq!(name.to_string(), "create-service");
        assert_eq!(name.as_str(), "create-service");
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new_random(), RunId::new_random());
    }
}

// crates/narrative-core/src/identifiers.rs
// ============================================================================
// Module: Narrative Engine Identifiers
// Description: Opaque string identifiers for stories, events, and entities.
// Purpose: Provide strongly typed, serializable identifiers with stable wire forms.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every identifier in the narrative consistency engine is an opaque UTF-8
//! string; equality is string equality. Wrapping each kind in its own
//! newtype prevents accidentally passing a `CharacterId` where a
//! `LocationId` is expected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;

// ============================================================================
// SECTION: Macro-Free Identifier Boilerplate
// ============================================================================

/// Defines an opaque, string-backed identifier newtype.
macro_rules! opaque_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        ///
        /// # Invariants
        /// - Opaque UTF-8 string; equality is string equality.
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the identifier, returning the owned string.
            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

opaque_id!(StoryId, "Identifier for a story / `CanonicalState` aggregate.");
opaque_id!(PlayerId, "Identifier for the player entity.");
opaque_id!(CharacterId, "Identifier for a character entity.");
opaque_id!(ItemId, "Identifier for an item entity.");
opaque_id!(LocationId, "Identifier for a location entity.");
opaque_id!(FactionId, "Identifier for a faction entity.");
opaque_id!(QuestId, "Identifier for a quest.");
opaque_id!(ConstraintId, "Identifier for an immutable or declared constraint.");

/// Identifier for an [`Event`](crate::event::Event).
///
/// # Invariants
/// - Must begin with the literal prefix `evt_`; enforced at construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

/// Required prefix for every event identifier.
pub const EVENT_ID_PREFIX: &str = "evt_";

impl EventId {
    /// Creates a new event identifier, validating the `evt_` prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedEvent`] when `id` does not start with
    /// `evt_`.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if !id.starts_with(EVENT_ID_PREFIX) {
            return Err(CoreError::MalformedEvent {
                reason: format!("event_id must start with '{EVENT_ID_PREFIX}': {id}"),
            });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_id_requires_prefix() {
        assert!(EventId::new("evt_1_2_abcd1234").is_ok());
        assert!(EventId::new("oops_1").is_err());
    }

    #[test]
    fn opaque_ids_round_trip_through_json() {
        let id = LocationId::new("luoyang");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"luoyang\"");
        let back: LocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}

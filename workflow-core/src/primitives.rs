//! Strongly typed identifiers used across the execution tree.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh, time-sortable identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifies an activity in the workflow definition (a node of the authored graph).
    ActivityId
);

string_id!(
    /// Identifies one execution of an activity inside a workflow instance.
    ActivityInstanceId
);

string_id!(
    /// Identifies a bookmark; unique within a workflow instance.
    BookmarkId
);

string_id!(
    /// Correlation identifier returned by a background scheduler.
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = BookmarkId::generate();
        let b = BookmarkId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = JobId::new("J-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"J-42\"");
        assert_eq!(id.to_string(), "J-42");
    }
}

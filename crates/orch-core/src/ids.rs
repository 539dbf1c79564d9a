//! Newtype identifiers used across the orchestration core.
//!
//! Plain `String` ids are easy to transpose (passing a team id where an
//! agent id is expected); these wrappers give the compiler a chance to
//! catch that class of bug while still serializing as bare strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_type!(AgentId);
id_type!(TeamId);
id_type!(DocumentId);
id_type!(HandoffId);
id_type!(WorkflowId);
id_type!(WorkflowInstanceId);
id_type!(GateId);
id_type!(ReportId);

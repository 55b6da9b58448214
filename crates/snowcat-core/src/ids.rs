//! Newtype identifiers for the entities named in the data model: streams,
//! queues, stages, and consumers. Kept as thin string wrappers (not enums)
//! since the framework treats all of these as opaque, operator-assigned
//! names — see spec.md §3.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(StreamId, "Opaque user/entity id identifying a stream.");
string_id!(QueueName, "Name of a per-stream append-only queue.");
string_id!(StageName, "Unique stage (categorizer) name within a topology.");
string_id!(ConsumerName, "Name of a queue consumer, used for marks.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_string() {
        let s = StreamId::from("user-42");
        assert_eq!(s.to_string(), "user-42");
        assert_eq!(s.as_str(), "user-42");
    }

    #[test]
    fn ids_are_ordered_for_btreemap_use() {
        let mut v = vec![StageName::from("b"), StageName::from("a")];
        v.sort();
        assert_eq!(v, vec![StageName::from("a"), StageName::from("b")]);
    }
}

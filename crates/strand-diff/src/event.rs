use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strand_types::{Cid, Tid};

/// The two ordered collections every namespace holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Posts,
    Interactions,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Posts, Collection::Interactions];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Posts => "posts",
            Collection::Interactions => "interactions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "posts" => Ok(Collection::Posts),
            "interactions" => Ok(Collection::Interactions),
            other => Err(format!("unknown collection: {other}")),
        }
    }
}

/// A domain-level change between two repository states.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    AddedObject {
        namespace: String,
        collection: Collection,
        tid: Tid,
        cid: Cid,
    },
    UpdatedObject {
        namespace: String,
        collection: Collection,
        tid: Tid,
        prev: Cid,
        cid: Cid,
    },
    DeletedObject {
        namespace: String,
        collection: Collection,
        tid: Tid,
    },
    DeletedNamespace {
        namespace: String,
    },
}

impl Event {
    /// The namespace the event concerns.
    pub fn namespace(&self) -> &str {
        match self {
            Event::AddedObject { namespace, .. }
            | Event::UpdatedObject { namespace, .. }
            | Event::DeletedObject { namespace, .. }
            | Event::DeletedNamespace { namespace } => namespace,
        }
    }
}

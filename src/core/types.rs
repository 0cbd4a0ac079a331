use super::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub type Row = Vec<Value>;

/// Logical unit of cached/invalidatable storage touched by an action,
/// usually a table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSpace(String);

impl TableSpace {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TableSpace {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TableSpace {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for TableSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static NEXT_INSTANCE_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a live entity instance held by the session.
///
/// Two property values referring to the same in-memory entity carry the same
/// key, independent of the database identifier (which may not exist yet for
/// identity inserts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey(pub u64);

impl InstanceKey {
    pub fn new() -> Self {
        InstanceKey(NEXT_INSTANCE_KEY.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for InstanceKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance_{}", self.0)
    }
}

/// Database identifier of an entity or collection owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Integer(i64),
    Text(String),
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Self::Integer(id)
    }
}

impl From<i32> for Identifier {
    fn from(id: i32) -> Self {
        Self::Integer(i64::from(id))
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        match id {
            Identifier::Integer(i) => Value::Integer(i),
            Identifier::Text(s) => Value::Text(s),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Text(s) => f.write_str(s),
        }
    }
}

//! Identifier for records held in the local store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Locally unique record identifier.
///
/// Assigned by the local store on insert. Ids increase with insertion order
/// and are never reused within one store, even after a bulk clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wraps a raw row id.
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the raw row id.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

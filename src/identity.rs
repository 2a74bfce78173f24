use std::fmt;

use serde::{Deserialize, Serialize};

pub const SEPARATOR: &str = "_";

/// Per-person grouping key.
///
/// Derived keys concatenate the narrator's name and age. Two different people
/// sharing both collide and are counted as one person; that risk is accepted.
/// When a unique interview identifier is available, build the key with
/// [`PersonId::external`] instead.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    pub fn derive(name: &str, age: u32) -> Self {
        Self(format!("{}{SEPARATOR}{age}", name.trim()))
    }

    pub fn external(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

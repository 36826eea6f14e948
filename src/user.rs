use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Opaque account identifier shared by every participant-facing record.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Display hints that may arrive with a route before live data is loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub name: Option<String>,
    pub handle: Option<String>,
    pub photo: Option<String>,
}

impl Hint {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.handle.is_none() && self.photo.is_none()
    }
}

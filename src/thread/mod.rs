use std::fmt::Display;
use std::sync::Arc;

use repository::ThreadRepository;
use serde::{Deserialize, Serialize};
use service::ThreadService;

use crate::{integration, user};

pub mod model;
pub mod repository;
pub mod service;

pub type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn ThreadRepository + Send + Sync>;
pub type Service = Arc<dyn ThreadService + Send + Sync>;

/// Opaque thread identifier taken from the route.
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

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("thread not found: {0}")]
    NotFound(Id),
    #[error("{0} is not a participant of thread {1}")]
    NotMember(user::Id, Id),
    #[error("cannot open a thread with oneself: {0}")]
    SelfThread(user::Id),
    #[error("participants should be different, got both: {0}")]
    SameParticipants(user::Id),

    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

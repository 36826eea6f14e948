use std::sync::Arc;

use channel::PresenceChannel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::integration;

pub mod channel;
pub mod heartbeat;
pub mod peer;
pub mod typing;

pub type Channel = Arc<dyn PresenceChannel + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Online,
    Offline,
}

/// Connection state published by the presence backend, read-only here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub state: Presence,
    pub last_changed: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn online(at: DateTime<Utc>) -> Self {
        Self {
            state: Presence::Online,
            last_changed: at,
        }
    }

    pub fn offline(at: DateTime<Utc>) -> Self {
        Self {
            state: Presence::Offline,
            last_changed: at,
        }
    }

    pub fn is_online(&self) -> bool {
        self.state == Presence::Online
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{self, Kind, model::Message};
use crate::{thread, user};

/// Snapshot of the newest message, kept for inbox rendering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: message::Id,
    pub from: user::Id,
    pub kind: Kind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LastMessage {
    pub fn of(msg: &Message, created_at: DateTime<Utc>) -> Self {
        Self {
            id: msg.id().clone(),
            from: msg.from().clone(),
            kind: msg.kind(),
            preview: msg.content().text().map(str::to_owned),
            created_at,
        }
    }
}

/// Per-participant summary of a thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mirror {
    pub owner: user::Id,
    pub thread_id: thread::Id,
    pub peer: user::Id,
    pub unread: u32,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
}

impl Mirror {
    pub fn new(
        owner: user::Id,
        thread_id: thread::Id,
        peer: user::Id,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner,
            thread_id,
            peer,
            unread: 0,
            updated_at: now,
            last_read_at: None,
            last_message: None,
        }
    }

    pub fn mark_read(&mut self, now: DateTime<Utc>) {
        self.unread = 0;
        self.last_read_at = Some(now);
        self.updated_at = now;
    }
}

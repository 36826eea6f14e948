use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::model::Listing;
use crate::user;

use super::Id;

/// The sorted participant pair of a two-party thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[user::Id; 2]", into = "[user::Id; 2]")]
pub struct Participants([user::Id; 2]);

impl Participants {
    pub fn new(a: user::Id, b: user::Id) -> super::Result<Self> {
        if a == b {
            return Err(super::Error::SameParticipants(a));
        }

        let pair = if a < b { [a, b] } else { [b, a] };
        Ok(Self(pair))
    }

    pub fn contains(&self, user: &user::Id) -> bool {
        self.0.contains(user)
    }

    /// The participant that is not `me`.
    pub fn other(&self, me: &user::Id) -> Option<&user::Id> {
        match &self.0 {
            [a, b] if a == me => Some(b),
            [a, b] if b == me => Some(a),
            _ => None,
        }
    }

    pub fn as_array(&self) -> &[user::Id; 2] {
        &self.0
    }
}

impl TryFrom<[user::Id; 2]> for Participants {
    type Error = super::Error;

    fn try_from([a, b]: [user::Id; 2]) -> Result<Self, Self::Error> {
        Self::new(a, b)
    }
}

impl From<Participants> for [user::Id; 2] {
    fn from(p: Participants) -> Self {
        p.0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ThreadContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<Listing>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    id: Id,
    participants: Participants,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    typing: HashMap<user::Id, bool>,
    #[serde(default)]
    active: HashMap<user::Id, DateTime<Utc>>,
    #[serde(default)]
    context: ThreadContext,
}

impl Thread {
    pub fn new(id: Id, participants: Participants, now: DateTime<Utc>) -> Self {
        Self {
            id,
            participants,
            created_at: now,
            updated_at: now,
            typing: HashMap::new(),
            active: HashMap::new(),
            context: ThreadContext::default(),
        }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub const fn participants(&self) -> &Participants {
        &self.participants
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub const fn context(&self) -> &ThreadContext {
        &self.context
    }

    pub fn is_typing(&self, user: &user::Id) -> bool {
        self.typing.get(user).copied().unwrap_or(false)
    }

    pub fn active_at(&self, user: &user::Id) -> Option<DateTime<Utc>> {
        self.active.get(user).copied()
    }

    /// Merge semantics of an upsert: only the bookkeeping timestamp moves.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn set_context(&mut self, context: ThreadContext) {
        self.context = context;
    }

    /// Applies a single field-scoped write; nothing else in the document changes.
    pub fn apply(&mut self, field: &Field) {
        match field {
            Field::Typing(user, typing) => {
                self.typing.insert(user.clone(), *typing);
            }
            Field::Active(user, at) => {
                self.active.insert(user.clone(), *at);
            }
        }
    }

    pub fn remove(&mut self, path: &FieldPath) {
        match path {
            FieldPath::Typing(user) => {
                self.typing.remove(user);
            }
            FieldPath::Active(user) => {
                self.active.remove(user);
            }
        }
    }
}

/// Per-participant sub-key of the shared thread document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldPath {
    Typing(user::Id),
    Active(user::Id),
}

impl FieldPath {
    pub fn as_path(&self) -> String {
        match self {
            Self::Typing(user) => format!("typing.{user}"),
            Self::Active(user) => format!("active.{user}"),
        }
    }
}

/// A value for one [`FieldPath`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    Typing(user::Id, bool),
    Active(user::Id, DateTime<Utc>),
}

impl Field {
    pub fn path(&self) -> FieldPath {
        match self {
            Self::Typing(user, _) => FieldPath::Typing(user.clone()),
            Self::Active(user, _) => FieldPath::Active(user.clone()),
        }
    }
}

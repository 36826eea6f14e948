use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{thread, user};

use super::{Id, Kind, MediaKind};

/// Product reference embedded in a message or pinned to a thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Url>,
    pub price: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text {
        text: String,
    },
    Image {
        url: Option<Url>,
    },
    Audio {
        url: Option<Url>,
    },
    Product {
        text: Option<String>,
        listing: Listing,
    },
}

impl Content {
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Text { .. } => Kind::Text,
            Self::Image { .. } => Kind::Image,
            Self::Audio { .. } => Kind::Audio,
            Self::Product { .. } => Kind::Product,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Product { text, .. } => text.as_deref(),
            Self::Image { .. } | Self::Audio { .. } => None,
        }
    }

    pub fn listing(&self) -> Option<&Listing> {
        match self {
            Self::Product { listing, .. } => Some(listing),
            _ => None,
        }
    }

    pub fn media_url(&self) -> Option<&Url> {
        match self {
            Self::Image { url } | Self::Audio { url } => url.as_ref(),
            _ => None,
        }
    }

    fn set_media_url(&mut self, new: Url) {
        if let Self::Image { url } | Self::Audio { url } = self {
            *url = Some(new);
        }
    }
}

/// Delivery state of a message, from local echo to terminal outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum State {
    /// Written locally, server timestamp not yet assigned.
    Sending,
    /// Placeholder stored, payload upload in flight.
    Uploading,
    Sent,
    Failed { reason: String },
}

/// Terminal update of a media placeholder.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch {
    Sent { url: Url },
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: Id,
    thread_id: thread::Id,
    from: user::Id,
    to: user::Id,
    #[serde(flatten)]
    content: Content,
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    state: State,
    #[serde(default)]
    read_by: Vec<user::Id>,
}

impl Message {
    pub fn outgoing(thread_id: thread::Id, from: user::Id, to: user::Id, content: Content) -> Self {
        Self {
            id: Id::random(),
            thread_id,
            from,
            to,
            content,
            created_at: None,
            state: State::Sending,
            read_by: Vec::new(),
        }
    }

    /// An empty media message shown while its payload uploads.
    pub fn placeholder(
        thread_id: thread::Id,
        from: user::Id,
        to: user::Id,
        kind: MediaKind,
    ) -> Self {
        let content = match kind {
            MediaKind::Image => Content::Image { url: None },
            MediaKind::Audio => Content::Audio { url: None },
        };

        Self {
            state: State::Uploading,
            ..Self::outgoing(thread_id, from, to, content)
        }
    }

    pub fn with_id(self, id: Id) -> Self {
        Self { id, ..self }
    }

    pub const fn id(&self) -> &Id {
        &self.id
    }

    pub const fn thread_id(&self) -> &thread::Id {
        &self.thread_id
    }

    pub const fn from(&self) -> &user::Id {
        &self.from
    }

    pub const fn to(&self) -> &user::Id {
        &self.to
    }

    pub const fn content(&self) -> &Content {
        &self.content
    }

    pub const fn kind(&self) -> Kind {
        self.content.kind()
    }

    pub const fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub const fn state(&self) -> &State {
        &self.state
    }

    pub fn read_by(&self) -> &[user::Id] {
        &self.read_by
    }

    pub fn is_uploading(&self) -> bool {
        self.state == State::Uploading
    }

    pub fn is_error(&self) -> bool {
        matches!(self.state, State::Failed { .. })
    }

    /// Ordering key; `None` until the server assigned a timestamp.
    pub fn key(&self) -> Option<(DateTime<Utc>, Id)> {
        self.created_at.map(|at| (at, self.id.clone()))
    }

    /// Server-side timestamp assignment. A timestamp, once set, never moves.
    pub fn stamp(&mut self, at: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(at);
        }
        if self.state == State::Sending {
            self.state = State::Sent;
        }
    }

    pub fn apply(&mut self, patch: &Patch) {
        match patch {
            Patch::Sent { url } => {
                self.content.set_media_url(url.clone());
                self.state = State::Sent;
            }
            Patch::Failed { reason } => self.fail(reason),
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = State::Failed {
            reason: reason.into(),
        };
    }

    pub fn mark_read_by(&mut self, user: &user::Id) {
        if !self.read_by.contains(user) {
            self.read_by.push(user.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str) -> Message {
        Message::outgoing(
            "t1".into(),
            "u1".into(),
            "u2".into(),
            Content::Text { text: body.into() },
        )
    }

    #[test]
    fn stamping_is_final() {
        let mut msg = text("hi");
        assert_eq!(msg.state(), &State::Sending);
        assert!(msg.key().is_none());

        let first = Utc::now();
        msg.stamp(first);
        msg.stamp(first + chrono::Duration::seconds(5));

        assert_eq!(msg.created_at(), Some(first));
        assert_eq!(msg.state(), &State::Sent);
    }

    #[test]
    fn placeholder_keeps_uploading_after_stamp() {
        let mut msg = Message::placeholder("t1".into(), "u1".into(), "u2".into(), MediaKind::Image);
        msg.stamp(Utc::now());

        assert!(msg.is_uploading());
        assert_eq!(msg.kind(), Kind::Image);
        assert!(msg.content().media_url().is_none());
    }

    #[test]
    fn patch_sets_url_and_state() {
        let mut msg = Message::placeholder("t1".into(), "u1".into(), "u2".into(), MediaKind::Audio);
        let url = Url::parse("memory://blobs/a.webm").unwrap();

        msg.apply(&Patch::Sent { url: url.clone() });
        assert_eq!(msg.state(), &State::Sent);
        assert_eq!(msg.content().media_url(), Some(&url));

        msg.apply(&Patch::Failed {
            reason: "boom".into(),
        });
        assert!(msg.is_error());
        assert!(!msg.is_uploading());
    }

    #[test]
    fn serializes_type_and_state_tags() {
        let msg = text("hello");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hello");
        assert_eq!(json["state"], "sending");
    }
}

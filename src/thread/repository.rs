use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::integration;

use super::Id;
use super::model::{Field, FieldPath, Participants, Thread, ThreadContext};

/// Live snapshots of a thread document; the first item is the current state.
pub type ThreadStream = Pin<Box<dyn Stream<Item = integration::Result<Option<Thread>>> + Send>>;

#[async_trait]
pub trait ThreadRepository {
    async fn find_by_id(&self, id: &Id) -> integration::Result<Option<Thread>>;

    /// Creates the document if absent, otherwise only bumps `updated_at`.
    /// Participants and `created_at` are never rewritten.
    async fn upsert(
        &self,
        id: &Id,
        participants: &Participants,
        now: DateTime<Utc>,
    ) -> integration::Result<Thread>;

    async fn set_field(&self, id: &Id, field: &Field) -> integration::Result<()>;

    async fn delete_field(&self, id: &Id, path: &FieldPath) -> integration::Result<()>;

    async fn set_context(&self, id: &Id, context: &ThreadContext) -> integration::Result<()>;

    async fn watch(&self, id: &Id) -> integration::Result<ThreadStream>;
}

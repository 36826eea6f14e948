use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::{integration, thread};

use super::Id;
use super::model::{Message, Patch};

/// Live tail snapshots, each ascending by `(created_at, id)`.
pub type WindowStream = Pin<Box<dyn Stream<Item = integration::Result<Vec<Message>>> + Send>>;

#[async_trait]
pub trait MessageRepository {
    /// Stores the message and returns it with its server-assigned timestamp.
    async fn insert(&self, message: &Message) -> integration::Result<Message>;

    async fn patch(&self, thread_id: &thread::Id, id: &Id, patch: &Patch)
    -> integration::Result<()>;

    /// Last `limit` messages of the thread, re-emitted on every change.
    async fn subscribe_tail(
        &self,
        thread_id: &thread::Id,
        limit: usize,
    ) -> integration::Result<WindowStream>;

    /// Up to `limit` messages strictly before the `anchor` document,
    /// ascending. The anchor is a document, not a timestamp, so messages
    /// sharing a timestamp are neither skipped nor repeated.
    async fn find_before(
        &self,
        thread_id: &thread::Id,
        anchor: &Id,
        limit: usize,
    ) -> integration::Result<Vec<Message>>;
}

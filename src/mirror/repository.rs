use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{integration, thread, user};

use super::model::Mirror;

#[async_trait]
pub trait MirrorRepository {
    async fn find(
        &self,
        owner: &user::Id,
        thread_id: &thread::Id,
    ) -> integration::Result<Option<Mirror>>;

    /// Upserts `{unread: 0, last_read_at: now}` for the owner's mirror,
    /// leaving every other field untouched.
    async fn reset_unread(
        &self,
        owner: &user::Id,
        thread_id: &thread::Id,
        peer: &user::Id,
        now: DateTime<Utc>,
    ) -> integration::Result<()>;
}

use async_trait::async_trait;
use chrono::Utc;
use log::debug;

use crate::{thread, user};

use super::Repository;
use super::model::Mirror;

#[async_trait]
pub trait MirrorService {
    /// Opening a thread means reading it: resets the owner's unread marker.
    /// Incrementing the peer's counter is left to the backend.
    async fn mark_read(
        &self,
        owner: &user::Id,
        thread_id: &thread::Id,
        peer: &user::Id,
    ) -> super::Result<()>;

    async fn find(&self, owner: &user::Id, thread_id: &thread::Id)
    -> super::Result<Option<Mirror>>;
}

#[derive(Clone)]
pub struct MirrorServiceImpl {
    repo: Repository,
}

impl MirrorServiceImpl {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl MirrorService for MirrorServiceImpl {
    async fn mark_read(
        &self,
        owner: &user::Id,
        thread_id: &thread::Id,
        peer: &user::Id,
    ) -> super::Result<()> {
        debug!("resetting unread of {owner} in thread {thread_id}");
        self.repo
            .reset_unread(owner, thread_id, peer, Utc::now())
            .await?;
        Ok(())
    }

    async fn find(
        &self,
        owner: &user::Id,
        thread_id: &thread::Id,
    ) -> super::Result<Option<Mirror>> {
        let mirror = self.repo.find(owner, thread_id).await?;
        Ok(mirror)
    }
}

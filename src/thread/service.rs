use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info};

use crate::message::model::Listing;
use crate::user;

use super::model::{Participants, Thread, ThreadContext};
use super::{Id, Repository};

/// Outcome of a successful resolution. Dependent components are built from
/// this value, so none of them can run against a missing document.
#[derive(Clone, Debug)]
pub struct Ready {
    thread: Thread,
    me: user::Id,
    peer: user::Id,
}

impl Ready {
    pub const fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn thread_id(&self) -> &Id {
        self.thread.id()
    }

    pub const fn me(&self) -> &user::Id {
        &self.me
    }

    pub const fn peer(&self) -> &user::Id {
        &self.peer
    }
}

#[async_trait]
pub trait ThreadService {
    /// Derives the peer when absent and idempotently creates the thread.
    async fn resolve(
        &self,
        id: &Id,
        me: &user::Id,
        peer: Option<&user::Id>,
    ) -> super::Result<Ready>;

    /// Records the product the thread is currently about.
    async fn reference_listing(&self, id: &Id, listing: &Listing) -> super::Result<()>;

    async fn referenced_listing(&self, id: &Id) -> super::Result<Option<Listing>>;
}

#[derive(Clone)]
pub struct ThreadServiceImpl {
    repo: Repository,
}

impl ThreadServiceImpl {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ThreadService for ThreadServiceImpl {
    async fn resolve(
        &self,
        id: &Id,
        me: &user::Id,
        peer: Option<&user::Id>,
    ) -> super::Result<Ready> {
        let peer = match peer {
            Some(peer) => peer.clone(),
            None => {
                debug!("no peer given for thread {id}, deriving from participants");
                let thread = self
                    .repo
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| super::Error::NotFound(id.clone()))?;

                thread
                    .participants()
                    .other(me)
                    .cloned()
                    .ok_or_else(|| super::Error::NotMember(me.clone(), id.clone()))?
            }
        };

        if peer.eq(me) {
            return Err(super::Error::SelfThread(me.clone()));
        }

        let participants = Participants::new(me.clone(), peer.clone())?;
        if let Some(existing) = self.repo.find_by_id(id).await? {
            if existing.participants().ne(&participants) {
                return Err(super::Error::NotMember(me.clone(), id.clone()));
            }
        }
        let thread = self.repo.upsert(id, &participants, Utc::now()).await?;

        if thread.participants().ne(&participants) {
            return Err(super::Error::NotMember(me.clone(), id.clone()));
        }

        info!("thread {id} ready for {me} with {peer}");
        Ok(Ready {
            thread,
            me: me.clone(),
            peer,
        })
    }

    async fn reference_listing(&self, id: &Id, listing: &Listing) -> super::Result<()> {
        let context = ThreadContext {
            listing: Some(listing.clone()),
        };
        self.repo.set_context(id, &context).await?;
        Ok(())
    }

    async fn referenced_listing(&self, id: &Id) -> super::Result<Option<Listing>> {
        let thread = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| super::Error::NotFound(id.clone()))?;

        Ok(thread.context().listing.clone())
    }
}

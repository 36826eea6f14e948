use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::thread::service::Ready;
use crate::{thread, user};

use super::{Channel, PresenceRecord};

/// What the local user sees of the peer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PeerStatus {
    pub typing: bool,
    pub active_at: Option<DateTime<Utc>>,
    pub presence: Option<PresenceRecord>,
    /// Route hints shown until live data arrives.
    pub hint: user::Hint,
}

impl PeerStatus {
    /// The peer looked at this thread within the last `window`.
    pub fn is_active_now(&self, now: DateTime<Utc>, window: Duration) -> bool {
        let Some(at) = self.active_at else {
            return false;
        };
        match chrono::Duration::from_std(window) {
            Ok(window) => now.signed_duration_since(at) < window,
            Err(_) => true,
        }
    }

    pub fn is_online(&self) -> bool {
        self.presence.as_ref().is_some_and(PresenceRecord::is_online)
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.presence.as_ref().map(|p| p.last_changed)
    }
}

/// Folds the peer's typing/active fields of the thread document and its
/// presence record into one [`PeerStatus`].
pub struct PeerMonitor {
    status: watch::Receiver<PeerStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl PeerMonitor {
    pub async fn start(
        ready: &Ready,
        threads: thread::Repository,
        presence: Channel,
        hint: user::Hint,
    ) -> Self {
        let initial = PeerStatus {
            typing: ready.thread().is_typing(ready.peer()),
            active_at: ready.thread().active_at(ready.peer()),
            presence: None,
            hint,
        };
        let (tx, status) = watch::channel(initial);
        let tx = Arc::new(tx);
        let mut tasks = Vec::with_capacity(2);

        match threads.watch(ready.thread_id()).await {
            Ok(mut updates) => {
                let tx = Arc::clone(&tx);
                let peer = ready.peer().clone();
                tasks.push(tokio::spawn(async move {
                    while let Some(update) = updates.next().await {
                        match update {
                            Ok(Some(thread)) => {
                                let typing = thread.is_typing(&peer);
                                let active_at = thread.active_at(&peer);
                                tx.send_if_modified(|s| {
                                    let changed = s.typing != typing || s.active_at != active_at;
                                    s.typing = typing;
                                    s.active_at = active_at;
                                    changed
                                });
                            }
                            Ok(None) => debug!("thread document of {peer} disappeared"),
                            Err(e) => {
                                warn!("thread updates stopped: {e}");
                                break;
                            }
                        }
                    }
                }));
            }
            Err(e) => warn!("failed to watch thread {}: {e}", ready.thread_id()),
        }

        match presence.watch(ready.peer()).await {
            Ok(mut updates) => {
                let tx = Arc::clone(&tx);
                tasks.push(tokio::spawn(async move {
                    while let Some(update) = updates.next().await {
                        match update {
                            Ok(record) => {
                                tx.send_if_modified(|s| {
                                    let changed = s.presence != record;
                                    s.presence = record;
                                    changed
                                });
                            }
                            Err(e) => debug!("presence update failed: {e}"),
                        }
                    }
                }));
            }
            Err(e) => warn!("failed to watch presence of {}: {e}", ready.peer()),
        }

        Self { status, tasks }
    }

    pub fn status(&self) -> watch::Receiver<PeerStatus> {
        self.status.clone()
    }

    pub fn current(&self) -> PeerStatus {
        self.status.borrow().clone()
    }
}

impl Drop for PeerMonitor {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

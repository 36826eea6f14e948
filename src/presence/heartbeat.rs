use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::thread::model::{Field, FieldPath};
use crate::thread::service::Ready;
use crate::{thread, user};

/// Publishes `active.{me}` on the thread document while the view is visible.
pub struct Heartbeat {
    thread_id: thread::Id,
    me: user::Id,
    repo: thread::Repository,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Heartbeat {
    pub fn new(ready: &Ready, repo: thread::Repository, interval: Duration) -> Self {
        Self {
            thread_id: ready.thread_id().clone(),
            me: ready.me().clone(),
            repo,
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub async fn set_visible(&self, visible: bool) {
        if visible {
            self.show();
        } else {
            self.hide().await;
        }
    }

    /// Writes immediately, then on every interval. No-op while running.
    fn show(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let thread_id = self.thread_id.clone();
        let me = self.me.clone();
        let repo = self.repo.clone();
        let period = self.interval;

        debug!("starting heartbeat of {me} in thread {thread_id}");
        *task = Some(tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // first tick completes immediately
                ticker.tick().await;
                let field = Field::Active(me.clone(), Utc::now());
                if let Err(e) = repo.set_field(&thread_id, &field).await {
                    warn!("failed to publish heartbeat in thread {thread_id}: {e}");
                }
            }
        }));
    }

    /// Stops the interval and deletes the field once no write is in flight.
    async fn hide(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };

        task.abort();
        let _ = task.await;

        let path = FieldPath::Active(self.me.clone());
        match self.repo.delete_field(&self.thread_id, &path).await {
            Ok(()) => debug!("cleared {} in thread {}", path.as_path(), self.thread_id),
            Err(e) => warn!("failed to clear heartbeat in thread {}: {e}", self.thread_id),
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        let task = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };
        task.abort();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let thread_id = self.thread_id.clone();
        let path = FieldPath::Active(self.me.clone());
        let repo = self.repo.clone();
        runtime.spawn(async move {
            let _ = task.await;
            if let Err(e) = repo.delete_field(&thread_id, &path).await {
                debug!("failed to clear heartbeat of dropped session: {e}");
            }
        });
    }
}

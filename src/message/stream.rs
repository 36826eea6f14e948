use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use futures::StreamExt;
use log::{debug, error, warn};
use tokio::sync::{Mutex, Notify, RwLock, watch};
use tokio::task::JoinHandle;

use crate::lifecycle::Generation;
use crate::thread::service::Ready;
use crate::{mirror, thread, user};

use super::model::{Message, Patch};
use super::repository::WindowStream;
use super::timeline::Timeline;
use super::viewport::{RowMetrics, Viewport};
use super::{Id, Repository};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Status {
    Loading,
    Live,
    Stopped { reason: String },
}

/// Outcome of a backward page request.
#[derive(Debug, PartialEq, Eq)]
pub enum Page {
    Loaded { count: usize },
    Exhausted,
    /// Another page request is in flight.
    Busy,
    /// The live window has not been received yet.
    NotLoaded,
    /// The stream was closed or its history reloaded while the page was in
    /// flight.
    Abandoned,
}

/// Live view of one thread: the subscribed tail, pages loaded behind it and
/// local echoes, together with the scroll state of the list showing them.
pub struct MessageStream {
    thread_id: thread::Id,
    me: user::Id,
    peer: user::Id,
    repo: Repository,
    mirror: mirror::Service,
    window_size: usize,
    page_size: usize,
    metrics: Arc<dyn RowMetrics + Send + Sync>,
    timeline: RwLock<Timeline>,
    viewport: Mutex<Viewport>,
    status: watch::Sender<Status>,
    revision: watch::Sender<u64>,
    generation: Generation,
    paging: AtomicBool,
    close: Arc<Notify>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl MessageStream {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ready: &Ready,
        repo: Repository,
        mirror: mirror::Service,
        window_size: usize,
        page_size: usize,
        metrics: Arc<dyn RowMetrics + Send + Sync>,
        viewport_height: f64,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(Status::Loading);
        let (revision, _) = watch::channel(0);

        Arc::new(Self {
            thread_id: ready.thread().id().clone(),
            me: ready.me().clone(),
            peer: ready.peer().clone(),
            repo,
            mirror,
            window_size,
            page_size,
            metrics,
            timeline: RwLock::new(Timeline::new()),
            viewport: Mutex::new(Viewport::new(viewport_height)),
            status,
            revision,
            generation: Generation::new(),
            paging: AtomicBool::new(false),
            close: Arc::new(Notify::new()),
            task: std::sync::Mutex::new(None),
        })
    }

    pub const fn thread_id(&self) -> &thread::Id {
        &self.thread_id
    }

    /// Subscribes to the live tail and keeps applying its snapshots until
    /// the stream is closed or the subscription fails.
    pub async fn open(self: &Arc<Self>) -> super::Result<()> {
        self.status.send_replace(Status::Loading);

        let live = match self
            .repo
            .subscribe_tail(&self.thread_id, self.window_size)
            .await
        {
            Ok(live) => live,
            Err(e) => {
                error!("failed to subscribe to thread {}: {e}", self.thread_id);
                self.status.send_replace(Status::Stopped {
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let handle = tokio::spawn(listen(Arc::downgrade(self), Arc::clone(&self.close), live));
        if let Some(previous) = self.replace_task(Some(handle)) {
            previous.abort();
        }
        Ok(())
    }

    /// Stops the live subscription and abandons pages in flight.
    pub fn close(&self) {
        self.generation.advance();
        self.close.notify_one();
        if let Some(task) = self.replace_task(None) {
            task.abort();
        }
        self.status.send_if_modified(|status| match status {
            Status::Stopped { .. } => false,
            _ => {
                *status = Status::Stopped {
                    reason: "closed".into(),
                };
                true
            }
        });
        debug!("closed message stream of thread {}", self.thread_id);
    }

    pub fn status(&self) -> watch::Receiver<Status> {
        self.status.subscribe()
    }

    /// Ticks whenever the visible list changed.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.timeline.read().await.messages()
    }

    pub async fn get(&self, id: &Id) -> Option<Message> {
        self.timeline.read().await.get(id).cloned()
    }

    pub async fn viewport(&self) -> Viewport {
        self.viewport.lock().await.clone()
    }

    pub async fn is_exhausted(&self) -> bool {
        self.timeline.read().await.is_exhausted()
    }

    /// Fetches the page before the oldest loaded message and shifts the
    /// scroll offset so the rows on screen stay in place.
    pub async fn load_older(&self) -> super::Result<Page> {
        if self.paging.swap(true, Ordering::SeqCst) {
            return Ok(Page::Busy);
        }
        let page = self.fetch_older().await;
        self.paging.store(false, Ordering::SeqCst);
        page
    }

    async fn fetch_older(&self) -> super::Result<Page> {
        if self.is_closed() {
            return Err(super::Error::Closed);
        }
        let token = self.generation.token();

        let anchor = {
            let timeline = self.timeline.read().await;
            if timeline.is_exhausted() {
                return Ok(Page::Exhausted);
            }
            match timeline.oldest() {
                Some(oldest) => oldest.id().clone(),
                None => return Ok(Page::NotLoaded),
            }
        };

        let page = self
            .repo
            .find_before(&self.thread_id, &anchor, self.page_size)
            .await?;

        let (count, added, exhausted) = {
            let mut timeline = self.timeline.write().await;
            let anchored = timeline.oldest().is_some_and(|m| m.id() == &anchor);
            if !token.is_current() || !anchored {
                debug!("discarding page before {anchor}, history moved on");
                return Ok(Page::Abandoned);
            }
            let before = self.metrics.total(&timeline.messages());
            let count = timeline.prepend(page, self.page_size);
            let after = self.metrics.total(&timeline.messages());
            (count, after - before, timeline.is_exhausted())
        };

        self.viewport.lock().await.content_prepended(added);
        self.bump();

        debug!("loaded {count} older messages of thread {}", self.thread_id);
        if count == 0 && exhausted {
            Ok(Page::Exhausted)
        } else {
            Ok(Page::Loaded { count })
        }
    }

    /// Shows a message before the server acknowledged it.
    pub async fn stage(&self, msg: Message) {
        self.timeline.write().await.stage(msg);
        self.relayout().await;
    }

    /// Replaces the local echo with the acknowledged copy, so a send settles
    /// even when the live tail is gone.
    pub async fn confirm(&self, stored: Message) -> bool {
        let found = self.timeline.write().await.confirm(stored);
        if found {
            self.bump();
        }
        found
    }

    pub async fn fail(&self, id: &Id, reason: &str) -> bool {
        let found = self.timeline.write().await.fail(id, reason);
        if found {
            self.bump();
        }
        found
    }

    pub async fn patch_local(&self, id: &Id, patch: &Patch) -> bool {
        let found = self.timeline.write().await.patch(id, patch);
        if found {
            self.bump();
        }
        found
    }

    pub async fn scroll_to(&self, top: f64) {
        self.viewport.lock().await.scroll_to(top);
    }

    pub async fn scroll_to_bottom(&self) {
        self.viewport.lock().await.scroll_to_bottom();
    }

    pub async fn resize(&self, viewport_height: f64) {
        self.viewport.lock().await.resize(viewport_height);
    }

    async fn refresh(&self, window: Vec<Message>) {
        let applied = {
            let mut timeline = self.timeline.write().await;
            let applied = timeline.apply_window(window, self.window_size);
            if applied.reset {
                // pages requested against the dropped history are stale
                self.generation.advance();
            }
            applied
        };
        if applied.reset {
            warn!("history of thread {} reloaded from live tail", self.thread_id);
        }

        self.relayout().await;
        self.status.send_if_modified(|status| {
            if *status == Status::Loading {
                *status = Status::Live;
                true
            } else {
                false
            }
        });

        if let Err(e) = self
            .mirror
            .mark_read(&self.me, &self.thread_id, &self.peer)
            .await
        {
            warn!("failed to reset unread of thread {}: {e}", self.thread_id);
        }
    }

    async fn relayout(&self) {
        let total = {
            let timeline = self.timeline.read().await;
            self.metrics.total(&timeline.messages())
        };
        self.viewport.lock().await.content_resized(total);
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn is_closed(&self) -> bool {
        matches!(*self.status.borrow(), Status::Stopped { .. })
    }

    fn replace_task(&self, task: Option<JoinHandle<()>>) -> Option<JoinHandle<()>> {
        match self.task.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, task),
            Err(poisoned) => std::mem::replace(&mut *poisoned.into_inner(), task),
        }
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        if let Some(task) = self.replace_task(None) {
            task.abort();
        }
    }
}

async fn listen(stream: Weak<MessageStream>, close: Arc<Notify>, mut live: WindowStream) {
    loop {
        let next = tokio::select! {
            // close is notified => stop listening
            _ = close.notified() => break,
            next = live.next() => next,
        };

        let Some(this) = stream.upgrade() else {
            break;
        };
        match next {
            Some(Ok(window)) => this.refresh(window).await,
            Some(Err(e)) => {
                error!("live tail of thread {} failed: {e}", this.thread_id);
                this.status.send_replace(Status::Stopped { reason: e.to_string() });
                break;
            }
            None => {
                debug!("live tail of thread {} ended", this.thread_id);
                break;
            }
        }
    }
}

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::time::{self, Instant};

use thread_sync::composer::recorder::ScriptedMicrophone;
use thread_sync::integration;
use thread_sync::integration::blob::MemoryBlobStorage;
use thread_sync::integration::memory::{MemoryPresence, MemoryStore};
use thread_sync::message::model::{Listing, Message, Patch};
use thread_sync::message::repository::{MessageRepository, WindowStream};
use thread_sync::message::stream::{MessageStream, Status};
use thread_sync::session::{Config, Route, Services, ThreadSession};
use thread_sync::thread::model::{Field, FieldPath, Participants, Thread, ThreadContext};
use thread_sync::thread::repository::{ThreadRepository, ThreadStream};
use thread_sync::thread::service::{Ready, ThreadService, ThreadServiceImpl};
use thread_sync::{message, thread, user};

pub const THREAD: &str = "t1";
pub const ME: &str = "u1";
pub const PEER: &str = "u2";

#[derive(Clone, Debug, PartialEq)]
pub enum Write {
    Set(Field),
    Delete(FieldPath),
}

/// Thread repository that remembers every field write and when it happened.
#[derive(Clone)]
pub struct RecordingThreads {
    inner: MemoryStore,
    started: Instant,
    writes: Arc<Mutex<Vec<(Duration, Write)>>>,
}

impl RecordingThreads {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            started: Instant::now(),
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn record(&self, write: Write) {
        self.writes
            .lock()
            .unwrap()
            .push((self.started.elapsed(), write));
    }

    pub fn writes(&self) -> Vec<(Duration, Write)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn typing_writes(&self, user: &str) -> Vec<(Duration, bool)> {
        let user = user::Id::from(user);
        self.writes()
            .into_iter()
            .filter_map(|(at, w)| match w {
                Write::Set(Field::Typing(u, typing)) if u == user => Some((at, typing)),
                _ => None,
            })
            .collect()
    }

    pub fn active_sets(&self, user: &str) -> usize {
        let user = user::Id::from(user);
        self.writes()
            .iter()
            .filter(|(_, w)| matches!(w, Write::Set(Field::Active(u, _)) if *u == user))
            .count()
    }

    pub fn active_deletes(&self, user: &str) -> usize {
        let user = user::Id::from(user);
        self.writes()
            .iter()
            .filter(|(_, w)| matches!(w, Write::Delete(FieldPath::Active(u)) if *u == user))
            .count()
    }
}

#[async_trait]
impl ThreadRepository for RecordingThreads {
    async fn find_by_id(&self, id: &thread::Id) -> integration::Result<Option<Thread>> {
        self.inner.find_by_id(id).await
    }

    async fn upsert(
        &self,
        id: &thread::Id,
        participants: &Participants,
        now: DateTime<Utc>,
    ) -> integration::Result<Thread> {
        self.inner.upsert(id, participants, now).await
    }

    async fn set_field(&self, id: &thread::Id, field: &Field) -> integration::Result<()> {
        self.record(Write::Set(field.clone()));
        self.inner.set_field(id, field).await
    }

    async fn delete_field(&self, id: &thread::Id, path: &FieldPath) -> integration::Result<()> {
        self.record(Write::Delete(path.clone()));
        self.inner.delete_field(id, path).await
    }

    async fn set_context(
        &self,
        id: &thread::Id,
        context: &ThreadContext,
    ) -> integration::Result<()> {
        self.inner.set_context(id, context).await
    }

    async fn watch(&self, id: &thread::Id) -> integration::Result<ThreadStream> {
        self.inner.watch(id).await
    }
}

/// Writes reach the store immediately, acknowledgements come back after a
/// per-call delay.
pub struct DelayedAcks {
    inner: MemoryStore,
    delays: Mutex<VecDeque<Duration>>,
}

impl DelayedAcks {
    pub fn new(inner: MemoryStore, delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            inner,
            delays: Mutex::new(delays.into_iter().collect()),
        }
    }
}

#[async_trait]
impl MessageRepository for DelayedAcks {
    async fn insert(&self, message: &Message) -> integration::Result<Message> {
        let stored = self.inner.insert(message).await?;
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
        time::sleep(delay).await;
        Ok(stored)
    }

    async fn patch(
        &self,
        thread_id: &thread::Id,
        id: &message::Id,
        patch: &Patch,
    ) -> integration::Result<()> {
        self.inner.patch(thread_id, id, patch).await
    }

    async fn subscribe_tail(
        &self,
        thread_id: &thread::Id,
        limit: usize,
    ) -> integration::Result<WindowStream> {
        self.inner.subscribe_tail(thread_id, limit).await
    }

    async fn find_before(
        &self,
        thread_id: &thread::Id,
        anchor: &message::Id,
        limit: usize,
    ) -> integration::Result<Vec<Message>> {
        self.inner.find_before(thread_id, anchor, limit).await
    }
}

/// Resolution of one thread takes a fixed delay; the rest pass through.
pub struct SlowThreads {
    inner: thread::Service,
    slow: thread::Id,
    delay: Duration,
}

impl SlowThreads {
    pub fn new(inner: thread::Service, slow: &str, delay: Duration) -> Self {
        Self {
            inner,
            slow: slow.into(),
            delay,
        }
    }
}

#[async_trait]
impl ThreadService for SlowThreads {
    async fn resolve(
        &self,
        id: &thread::Id,
        me: &user::Id,
        peer: Option<&user::Id>,
    ) -> thread::Result<Ready> {
        if *id == self.slow {
            time::sleep(self.delay).await;
        }
        self.inner.resolve(id, me, peer).await
    }

    async fn reference_listing(&self, id: &thread::Id, listing: &Listing) -> thread::Result<()> {
        self.inner.reference_listing(id, listing).await
    }

    async fn referenced_listing(&self, id: &thread::Id) -> thread::Result<Option<Listing>> {
        self.inner.referenced_listing(id).await
    }
}

/// Older pages come back after a fixed delay.
pub struct SlowPages {
    inner: MemoryStore,
    delay: Duration,
}

impl SlowPages {
    pub fn new(inner: MemoryStore, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl MessageRepository for SlowPages {
    async fn insert(&self, message: &Message) -> integration::Result<Message> {
        self.inner.insert(message).await
    }

    async fn patch(
        &self,
        thread_id: &thread::Id,
        id: &message::Id,
        patch: &Patch,
    ) -> integration::Result<()> {
        self.inner.patch(thread_id, id, patch).await
    }

    async fn subscribe_tail(
        &self,
        thread_id: &thread::Id,
        limit: usize,
    ) -> integration::Result<WindowStream> {
        self.inner.subscribe_tail(thread_id, limit).await
    }

    async fn find_before(
        &self,
        thread_id: &thread::Id,
        anchor: &message::Id,
        limit: usize,
    ) -> integration::Result<Vec<Message>> {
        time::sleep(self.delay).await;
        self.inner.find_before(thread_id, anchor, limit).await
    }
}

pub struct Fixture {
    pub store: MemoryStore,
    pub threads: RecordingThreads,
    pub blobs: MemoryBlobStorage,
    pub presence: MemoryPresence,
    pub microphone: ScriptedMicrophone,
    pub services: Services,
}

impl Fixture {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let threads = RecordingThreads::new(store.clone());
        let blobs = MemoryBlobStorage::new();
        let presence = MemoryPresence::new();
        let microphone = ScriptedMicrophone::new(
            vec![Bytes::from_static(b"OggS"), Bytes::from_static(b"voice")],
            "audio/ogg",
            Duration::from_millis(100),
        );

        let mut services = Services::memory(
            &store,
            Arc::new(blobs.clone()),
            Arc::new(presence.clone()),
            Arc::new(microphone.clone()),
        );
        services.thread_repo = Arc::new(threads.clone());
        services.threads = Arc::new(ThreadServiceImpl::new(services.thread_repo.clone()));

        Self {
            store,
            threads,
            blobs,
            presence,
            microphone,
            services,
        }
    }

    pub fn with_messages(mut self, messages: message::Repository) -> Self {
        self.services.messages = messages;
        self
    }

    pub async fn resolve(&self) -> Ready {
        self.services
            .threads
            .resolve(&THREAD.into(), &ME.into(), Some(&PEER.into()))
            .await
            .unwrap()
    }

    pub async fn open(&self) -> ThreadSession {
        self.open_route(route()).await
    }

    pub async fn open_route(&self, route: Route) -> ThreadSession {
        ThreadSession::open(&self.services, &Config::default(), &ME.into(), route, 400.0)
            .await
            .unwrap()
    }
}

pub fn route() -> Route {
    Route {
        thread_id: THREAD.into(),
        peer: Some(PEER.into()),
        hint: user::Hint::default(),
        deep_link: None,
    }
}

pub fn text(from: &str, to: &str, body: &str) -> Message {
    Message::outgoing(
        THREAD.into(),
        from.into(),
        to.into(),
        message::model::Content::Text { text: body.into() },
    )
}

pub async fn wait_live(stream: &MessageStream) {
    let mut status = stream.status();
    time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| *s == Status::Live),
    )
    .await
    .expect("stream never became live")
    .unwrap();
}

/// Waits until the visible list satisfies `done`.
pub async fn wait_for_messages(stream: &MessageStream, done: impl Fn(&[Message]) -> bool) {
    let mut changes = stream.changes();
    let wait = async {
        loop {
            if done(&stream.messages().await) {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    };
    time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("messages never reached the expected state");
}

pub fn texts(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| m.content().text().map(str::to_owned))
        .collect()
}

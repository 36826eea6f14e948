use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use tokio::sync::watch;

use crate::message::model::{Message, Patch};
use crate::message::repository::{MessageRepository, WindowStream};
use crate::message::timeline::Key;
use crate::mirror::model::{LastMessage, Mirror};
use crate::mirror::repository::MirrorRepository;
use crate::presence::PresenceRecord;
use crate::presence::channel::{PresenceChannel, PresenceStream};
use crate::thread::model::{Field, FieldPath, Participants, Thread, ThreadContext};
use crate::thread::repository::{ThreadRepository, ThreadStream};
use crate::{integration, message, thread, user};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
struct MessageLog {
    docs: BTreeMap<Key, Message>,
    index: HashMap<message::Id, Key>,
}

struct Collection {
    log: MessageLog,
    changes: watch::Sender<u64>,
}

impl Default for Collection {
    fn default() -> Self {
        Self {
            log: MessageLog::default(),
            changes: watch::channel(0).0,
        }
    }
}

impl Collection {
    fn notify(&self) {
        self.changes.send_modify(|v| *v += 1);
    }

    fn tail(&self, limit: usize) -> Vec<Message> {
        let mut tail = self
            .log
            .docs
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect::<Vec<_>>();
        tail.reverse();
        tail
    }
}

#[derive(Default)]
struct Inner {
    threads: Mutex<HashMap<thread::Id, watch::Sender<Option<Thread>>>>,
    messages: Mutex<HashMap<thread::Id, Collection>>,
    mirrors: Mutex<HashMap<(user::Id, thread::Id), Mirror>>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    thread_creations: AtomicUsize,
    fail_subscriptions: AtomicBool,
    fail_field_writes: AtomicBool,
    fail_inserts: AtomicBool,
    fail_patches: AtomicBool,
}

/// Process-local document store backing threads, messages and mirrors.
///
/// Server timestamps are strictly increasing, so insertion order equals
/// display order. Inserts also play the backend trigger: the recipient's
/// unread counter grows and both mirrors record the last message.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many thread documents were created, as opposed to touched.
    pub fn thread_creations(&self) -> usize {
        self.inner.thread_creations.load(Ordering::SeqCst)
    }

    pub fn set_failing_subscriptions(&self, failing: bool) {
        self.inner.fail_subscriptions.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_field_writes(&self, failing: bool) {
        self.inner.fail_field_writes.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_inserts(&self, failing: bool) {
        self.inner.fail_inserts.store(failing, Ordering::SeqCst);
    }

    pub fn set_failing_patches(&self, failing: bool) {
        self.inner.fail_patches.store(failing, Ordering::SeqCst);
    }

    /// Seeds a message with a chosen server timestamp.
    pub fn insert_stamped(&self, message: &Message, at: DateTime<Utc>) -> Message {
        let mut stored = message.clone();
        stored.stamp(at);
        self.store(stored)
    }

    pub fn message_count(&self, thread_id: &thread::Id) -> usize {
        lock(&self.inner.messages)
            .get(thread_id)
            .map_or(0, |c| c.log.docs.len())
    }

    pub fn find_message(&self, thread_id: &thread::Id, id: &message::Id) -> Option<Message> {
        let messages = lock(&self.inner.messages);
        let collection = messages.get(thread_id)?;
        let key = collection.log.index.get(id)?;
        collection.log.docs.get(key).cloned()
    }

    /// Backend trigger: one more unread message for `owner`.
    pub fn increment_unread(&self, owner: &user::Id, msg: &Message, at: DateTime<Utc>) {
        let mut mirrors = lock(&self.inner.mirrors);
        let mirror = mirrors
            .entry((owner.clone(), msg.thread_id().clone()))
            .or_insert_with(|| {
                Mirror::new(owner.clone(), msg.thread_id().clone(), msg.from().clone(), at)
            });
        mirror.unread += 1;
        mirror.updated_at = at;
        mirror.last_message = Some(LastMessage::of(msg, at));
    }

    fn record_sent(&self, msg: &Message, at: DateTime<Utc>) {
        let mut mirrors = lock(&self.inner.mirrors);
        let mirror = mirrors
            .entry((msg.from().clone(), msg.thread_id().clone()))
            .or_insert_with(|| {
                Mirror::new(msg.from().clone(), msg.thread_id().clone(), msg.to().clone(), at)
            });
        mirror.updated_at = at;
        mirror.last_message = Some(LastMessage::of(msg, at));
    }

    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = lock(&self.inner.last_stamp);
        let now = Utc::now();
        let stamp = match *last {
            Some(prev) if prev >= now => prev + chrono::Duration::microseconds(1),
            _ => now,
        };
        *last = Some(stamp);
        stamp
    }

    fn store(&self, message: Message) -> Message {
        let Some(key) = message.key() else {
            return message;
        };

        let mut messages = lock(&self.inner.messages);
        let collection = messages.entry(message.thread_id().clone()).or_default();
        if let Some(existing) = collection
            .log
            .index
            .get(message.id())
            .and_then(|k| collection.log.docs.get(k))
        {
            return existing.clone();
        }

        collection.log.index.insert(message.id().clone(), key.clone());
        collection.log.docs.insert(key, message.clone());
        collection.notify();
        message
    }

    fn thread_sender(&self, id: &thread::Id) -> watch::Sender<Option<Thread>> {
        lock(&self.inner.threads)
            .entry(id.clone())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }

    fn modify_thread(
        &self,
        id: &thread::Id,
        f: impl FnOnce(&mut Thread),
    ) -> integration::Result<()> {
        let sender = self.thread_sender(id);
        let mut found = false;
        sender.send_if_modified(|doc| match doc {
            Some(thread) => {
                f(thread);
                found = true;
                true
            }
            None => false,
        });

        if found {
            Ok(())
        } else {
            Err(integration::Error::NotFound(format!("threads/{id}")))
        }
    }

    fn check_field_write(&self, id: &thread::Id) -> integration::Result<()> {
        if self.inner.fail_field_writes.load(Ordering::SeqCst) {
            return Err(integration::Error::Rejected(format!("threads/{id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ThreadRepository for MemoryStore {
    async fn find_by_id(&self, id: &thread::Id) -> integration::Result<Option<Thread>> {
        let threads = lock(&self.inner.threads);
        Ok(threads.get(id).and_then(|tx| tx.borrow().clone()))
    }

    async fn upsert(
        &self,
        id: &thread::Id,
        participants: &Participants,
        now: DateTime<Utc>,
    ) -> integration::Result<Thread> {
        let sender = self.thread_sender(id);
        let mut created = false;
        sender.send_modify(|doc| match doc {
            Some(thread) => thread.touch(now),
            None => {
                *doc = Some(Thread::new(id.clone(), participants.clone(), now));
                created = true;
            }
        });

        if created {
            self.inner.thread_creations.fetch_add(1, Ordering::SeqCst);
            debug!("created thread {id}");
        }

        sender
            .borrow()
            .clone()
            .ok_or_else(|| integration::Error::NotFound(format!("threads/{id}")))
    }

    async fn set_field(&self, id: &thread::Id, field: &Field) -> integration::Result<()> {
        self.check_field_write(id)?;
        self.modify_thread(id, |thread| thread.apply(field))
    }

    async fn delete_field(&self, id: &thread::Id, path: &FieldPath) -> integration::Result<()> {
        self.check_field_write(id)?;
        self.modify_thread(id, |thread| thread.remove(path))
    }

    async fn set_context(
        &self,
        id: &thread::Id,
        context: &ThreadContext,
    ) -> integration::Result<()> {
        self.modify_thread(id, |thread| thread.set_context(context.clone()))
    }

    async fn watch(&self, id: &thread::Id) -> integration::Result<ThreadStream> {
        if self.inner.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(integration::Error::Unavailable(format!("threads/{id}")));
        }

        let mut rx = self.thread_sender(id).subscribe();
        let stream = async_stream::stream! {
            loop {
                let current = rx.borrow_and_update().clone();
                yield Ok(current);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert(&self, message: &Message) -> integration::Result<Message> {
        if self.inner.fail_inserts.load(Ordering::SeqCst) {
            return Err(integration::Error::Unavailable(format!(
                "threads/{}/messages",
                message.thread_id()
            )));
        }

        let at = self.next_stamp();
        let mut stored = message.clone();
        stored.stamp(at);
        let stored = self.store(stored);

        self.increment_unread(stored.to(), &stored, at);
        self.record_sent(&stored, at);
        Ok(stored)
    }

    async fn patch(
        &self,
        thread_id: &thread::Id,
        id: &message::Id,
        patch: &Patch,
    ) -> integration::Result<()> {
        if self.inner.fail_patches.load(Ordering::SeqCst) {
            return Err(integration::Error::Rejected(format!(
                "threads/{thread_id}/messages/{id}"
            )));
        }

        let mut messages = lock(&self.inner.messages);
        let collection = messages
            .get_mut(thread_id)
            .ok_or_else(|| integration::Error::NotFound(format!("threads/{thread_id}")))?;

        let msg = collection
            .log
            .index
            .get(id)
            .and_then(|key| collection.log.docs.get_mut(key))
            .ok_or_else(|| {
                integration::Error::NotFound(format!("threads/{thread_id}/messages/{id}"))
            })?;
        msg.apply(patch);
        collection.notify();
        Ok(())
    }

    async fn subscribe_tail(
        &self,
        thread_id: &thread::Id,
        limit: usize,
    ) -> integration::Result<WindowStream> {
        if self.inner.fail_subscriptions.load(Ordering::SeqCst) {
            return Err(integration::Error::Unavailable(format!(
                "threads/{thread_id}/messages"
            )));
        }

        let mut rx = lock(&self.inner.messages)
            .entry(thread_id.clone())
            .or_default()
            .changes
            .subscribe();

        let store = self.clone();
        let thread_id = thread_id.clone();
        let stream = async_stream::stream! {
            loop {
                let window = lock(&store.inner.messages)
                    .get(&thread_id)
                    .map(|c| c.tail(limit))
                    .unwrap_or_default();
                yield Ok(window);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn find_before(
        &self,
        thread_id: &thread::Id,
        anchor: &message::Id,
        limit: usize,
    ) -> integration::Result<Vec<Message>> {
        let messages = lock(&self.inner.messages);
        let collection = messages
            .get(thread_id)
            .ok_or_else(|| integration::Error::NotFound(format!("threads/{thread_id}")))?;
        let key = collection.log.index.get(anchor).ok_or_else(|| {
            integration::Error::NotFound(format!("threads/{thread_id}/messages/{anchor}"))
        })?;

        let mut page = collection
            .log
            .docs
            .range(..key.clone())
            .rev()
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect::<Vec<_>>();
        page.reverse();
        Ok(page)
    }
}

#[async_trait]
impl MirrorRepository for MemoryStore {
    async fn find(
        &self,
        owner: &user::Id,
        thread_id: &thread::Id,
    ) -> integration::Result<Option<Mirror>> {
        let mirrors = lock(&self.inner.mirrors);
        Ok(mirrors.get(&(owner.clone(), thread_id.clone())).cloned())
    }

    async fn reset_unread(
        &self,
        owner: &user::Id,
        thread_id: &thread::Id,
        peer: &user::Id,
        now: DateTime<Utc>,
    ) -> integration::Result<()> {
        let mut mirrors = lock(&self.inner.mirrors);
        mirrors
            .entry((owner.clone(), thread_id.clone()))
            .or_insert_with(|| Mirror::new(owner.clone(), thread_id.clone(), peer.clone(), now))
            .mark_read(now);
        Ok(())
    }
}

/// Presence records set by hand.
#[derive(Clone, Default)]
pub struct MemoryPresence {
    users: Arc<Mutex<HashMap<user::Id, watch::Sender<Option<PresenceRecord>>>>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user: &user::Id, record: Option<PresenceRecord>) {
        self.sender(user).send_replace(record);
    }

    fn sender(&self, user: &user::Id) -> watch::Sender<Option<PresenceRecord>> {
        lock(&self.users)
            .entry(user.clone())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }
}

#[async_trait]
impl PresenceChannel for MemoryPresence {
    async fn watch(&self, user: &user::Id) -> integration::Result<PresenceStream> {
        let mut rx = self.sender(user).subscribe();
        let stream = async_stream::stream! {
            loop {
                let current = rx.borrow_and_update().clone();
                yield Ok(current);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use futures::StreamExt;

    use super::*;
    use crate::message::model::Content;

    fn text(body: &str) -> Message {
        Message::outgoing(
            "t1".into(),
            "u1".into(),
            "u2".into(),
            Content::Text { text: body.into() },
        )
    }

    #[tokio::test]
    async fn upsert_creates_once_and_keeps_fields() {
        let store = MemoryStore::new();
        let id = thread::Id::from("t1");
        let participants = Participants::new("u1".into(), "u2".into()).unwrap();

        store.upsert(&id, &participants, Utc::now()).await.unwrap();
        store
            .set_field(&id, &Field::Typing("u1".into(), true))
            .await
            .unwrap();
        let thread = store.upsert(&id, &participants, Utc::now()).await.unwrap();

        assert_eq!(store.thread_creations(), 1);
        assert!(thread.is_typing(&"u1".into()));
    }

    #[tokio::test]
    async fn field_writes_need_a_document() {
        let store = MemoryStore::new();
        let res = store
            .set_field(&"missing".into(), &Field::Typing("u1".into(), true))
            .await;
        assert!(matches!(res, Err(integration::Error::NotFound(_))));
    }

    #[tokio::test]
    async fn stamps_are_strictly_increasing() {
        let store = MemoryStore::new();
        let mut stamps = Vec::new();
        for i in 0..10 {
            let stored = store.insert(&text(&i.to_string())).await.unwrap();
            stamps.push(stored.created_at().unwrap());
        }
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn find_before_anchors_on_document() {
        let store = MemoryStore::new();
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let ids = ["a", "b", "c", "d"];
        for id in ids {
            store.insert_stamped(&text(id).with_id(id.into()), at);
        }

        let page = store
            .find_before(&"t1".into(), &"c".into(), 10)
            .await
            .unwrap();
        let got = page.iter().map(|m| m.id().to_string()).collect::<Vec<_>>();
        assert_eq!(got, ["a", "b"]);
    }

    #[tokio::test]
    async fn tail_subscription_emits_on_insert() {
        let store = MemoryStore::new();
        let mut tail = store.subscribe_tail(&"t1".into(), 2).await.unwrap();

        assert!(tail.next().await.unwrap().unwrap().is_empty());

        for body in ["one", "two", "three"] {
            store.insert(&text(body)).await.unwrap();
        }
        let window = tail.next().await.unwrap().unwrap();
        let bodies = window
            .iter()
            .filter_map(|m| m.content().text())
            .collect::<Vec<_>>();
        assert_eq!(bodies, ["two", "three"]);
    }

    #[tokio::test]
    async fn insert_plays_the_unread_trigger() {
        let store = MemoryStore::new();
        store.insert(&text("hi")).await.unwrap();
        store.insert(&text("there")).await.unwrap();

        let peer = store.find(&"u2".into(), &"t1".into()).await.unwrap().unwrap();
        assert_eq!(peer.unread, 2);
        assert_eq!(
            peer.last_message.unwrap().preview.as_deref(),
            Some("there")
        );

        store
            .reset_unread(&"u2".into(), &"t1".into(), &"u1".into(), Utc::now())
            .await
            .unwrap();
        let peer = store.find(&"u2".into(), &"t1".into()).await.unwrap().unwrap();
        assert_eq!(peer.unread, 0);
        assert!(peer.last_read_at.is_some());
    }
}

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::Id;
use super::model::{Message, Patch};

/// Total order of stored messages: server timestamp, then document id.
pub type Key = (DateTime<Utc>, Id);

/// Result of merging one live snapshot.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Applied {
    pub inserted: usize,
    pub updated: usize,
    /// The snapshot did not connect to the loaded history, which was dropped.
    pub reset: bool,
}

/// Merged view of the live tail, the pages loaded behind it, and messages
/// echoed locally before the server acknowledged them.
///
/// Confirmed messages are kept strictly ascending by [`Key`] with one entry
/// per id; the loaded range is always contiguous, so the oldest entry is a
/// valid pagination cursor.
#[derive(Debug, Default)]
pub struct Timeline {
    confirmed: BTreeMap<Key, Message>,
    index: HashMap<Id, Key>,
    staged: Vec<Message>,
    exhausted: bool,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_window(&mut self, window: Vec<Message>, limit: usize) -> Applied {
        let keyed = window
            .into_iter()
            .filter_map(|m| match m.key() {
                Some(key) => Some((key, m)),
                None => {
                    warn!("skipping unstamped message {} in live window", m.id());
                    None
                }
            })
            .collect::<Vec<_>>();

        let overlaps = keyed.iter().any(|(_, m)| self.index.contains_key(m.id()));
        let detached = match (self.confirmed.keys().next_back(), keyed.first()) {
            (Some(last), Some((first, _))) => first > last,
            _ => false,
        };

        let mut applied = Applied::default();
        if keyed.len() >= limit && detached && !overlaps {
            debug!("live window detached from loaded history, resetting");
            self.confirmed.clear();
            self.index.clear();
            self.exhausted = false;
            applied.reset = true;
        }
        // A short tail is the whole thread.
        if keyed.len() < limit {
            self.exhausted = true;
        }

        for (key, msg) in keyed {
            self.staged.retain(|s| s.id() != msg.id());
            if self.upsert(key, msg) {
                applied.inserted += 1;
            } else {
                applied.updated += 1;
            }
        }

        applied
    }

    /// Merges an older page. Entries already known keep their live state.
    pub fn prepend(&mut self, page: Vec<Message>, page_size: usize) -> usize {
        if page.len() < page_size {
            self.exhausted = true;
        }

        let mut inserted = 0;
        for msg in page {
            let Some(key) = msg.key() else {
                warn!("skipping unstamped message {} in page", msg.id());
                continue;
            };
            if self.index.contains_key(msg.id()) {
                continue;
            }
            self.upsert(key, msg);
            inserted += 1;
        }

        inserted
    }

    /// Shows a message before the server has acknowledged it.
    pub fn stage(&mut self, msg: Message) {
        if self.index.contains_key(msg.id()) || self.staged.iter().any(|s| s.id() == msg.id()) {
            return;
        }
        self.staged.push(msg);
    }

    /// Swaps a staged echo for the copy the server acknowledged. The echo
    /// keeps its place until a live window carries the message; a copy
    /// already received live is left as is.
    pub fn confirm(&mut self, msg: Message) -> bool {
        if self.index.contains_key(msg.id()) {
            return false;
        }
        match self.staged.iter_mut().find(|s| s.id() == msg.id()) {
            Some(staged) => {
                *staged = msg;
                true
            }
            None => false,
        }
    }

    pub fn patch(&mut self, id: &Id, patch: &Patch) -> bool {
        self.update(id, |m| m.apply(patch))
    }

    pub fn fail(&mut self, id: &Id, reason: &str) -> bool {
        self.update(id, |m| m.fail(reason))
    }

    pub fn get(&self, id: &Id) -> Option<&Message> {
        match self.index.get(id) {
            Some(key) => self.confirmed.get(key),
            None => self.staged.iter().find(|m| m.id() == id),
        }
    }

    /// The pagination cursor.
    pub fn oldest(&self) -> Option<&Message> {
        self.confirmed.values().next()
    }

    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Confirmed messages ascending, followed by staged ones in send order.
    pub fn messages(&self) -> Vec<Message> {
        self.confirmed
            .values()
            .chain(self.staged.iter())
            .cloned()
            .collect()
    }

    fn upsert(&mut self, key: Key, msg: Message) -> bool {
        let fresh = match self.index.get(msg.id()) {
            Some(old) if *old != key => {
                self.confirmed.remove(old);
                false
            }
            Some(_) => false,
            None => true,
        };

        self.index.insert(msg.id().clone(), key.clone());
        self.confirmed.insert(key, msg);
        fresh
    }

    fn update(&mut self, id: &Id, f: impl FnOnce(&mut Message)) -> bool {
        let target = match self.index.get(id) {
            Some(key) => self.confirmed.get_mut(key),
            None => self.staged.iter_mut().find(|m| m.id() == id),
        };

        match target {
            Some(msg) => {
                f(msg);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::message::model::{Content, State};

    fn at(secs: i64, id: &str) -> Message {
        let mut msg = Message::outgoing(
            "t1".into(),
            "u1".into(),
            "u2".into(),
            Content::Text { text: id.into() },
        );
        msg = msg.with_id(Id::from(id));
        msg.stamp(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap());
        msg
    }

    fn assert_strictly_ascending(timeline: &Timeline) {
        let keys = timeline
            .messages()
            .iter()
            .filter_map(Message::key)
            .collect::<Vec<_>>();
        assert!(keys.windows(2).all(|w| w[0] < w[1]), "not ascending: {keys:?}");

        let mut ids = timeline
            .messages()
            .iter()
            .map(|m| m.id().clone())
            .collect::<Vec<_>>();
        let total = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total, "duplicate ids");
    }

    #[test]
    fn merges_live_and_paged_without_duplicates() {
        let mut timeline = Timeline::new();

        timeline.apply_window((10..15).map(|i| at(i, &format!("m{i:02}"))).collect(), 5);
        timeline.prepend((5..10).map(|i| at(i, &format!("m{i:02}"))).collect(), 5);
        // overlapping live refresh sliding forward
        timeline.apply_window((12..17).map(|i| at(i, &format!("m{i:02}"))).collect(), 5);
        // a page that overlaps what is already loaded
        timeline.prepend((3..7).map(|i| at(i, &format!("m{i:02}"))).collect(), 5);

        assert_strictly_ascending(&timeline);
        assert_eq!(timeline.len(), 14);
        assert_eq!(timeline.oldest().unwrap().id(), &Id::from("m03"));
        assert!(timeline.is_exhausted());
    }

    #[test]
    fn shared_timestamps_are_ordered_by_id() {
        let mut timeline = Timeline::new();

        timeline.apply_window(vec![at(5, "b"), at(5, "c")], 25);
        timeline.prepend(vec![at(5, "a")], 25);

        let ids = timeline
            .messages()
            .iter()
            .map(|m| m.id().to_string())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_strictly_ascending(&timeline);
    }

    #[test]
    fn staged_messages_are_replaced_by_server_copy() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![at(1, "m1")], 25);

        let pending = Message::outgoing(
            "t1".into(),
            "u1".into(),
            "u2".into(),
            Content::Text { text: "x".into() },
        )
        .with_id(Id::from("m2"));
        timeline.stage(pending);

        let last = timeline.messages().pop().unwrap();
        assert_eq!(last.state(), &State::Sending);
        assert_eq!(timeline.len(), 2);

        let applied = timeline.apply_window(vec![at(1, "m1"), at(2, "m2")], 25);
        assert_eq!(applied.inserted, 1);
        assert_eq!(applied.updated, 1);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline.get(&Id::from("m2")).unwrap().state(), &State::Sent);
    }

    #[test]
    fn acknowledged_echo_is_sent_before_the_live_copy() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![at(1, "m1")], 25);

        let pending = Message::outgoing(
            "t1".into(),
            "u1".into(),
            "u2".into(),
            Content::Text { text: "m2".into() },
        )
        .with_id(Id::from("m2"));
        timeline.stage(pending);

        assert!(timeline.confirm(at(2, "m2")));
        assert_eq!(timeline.get(&Id::from("m2")).unwrap().state(), &State::Sent);
        assert_eq!(timeline.oldest().unwrap().id(), &Id::from("m1"));
        assert_eq!(timeline.len(), 2);

        timeline.apply_window(vec![at(1, "m1"), at(2, "m2")], 25);
        assert_eq!(timeline.len(), 2);
        assert_strictly_ascending(&timeline);

        // the live copy wins over a late acknowledgement
        timeline.patch(&Id::from("m2"), &Patch::Failed { reason: "x".into() });
        assert!(!timeline.confirm(at(2, "m2")));
        assert!(timeline.get(&Id::from("m2")).unwrap().is_error());
    }

    #[test]
    fn detached_full_window_resets_history() {
        let mut timeline = Timeline::new();
        timeline.apply_window((0..3).map(|i| at(i, &format!("m{i:02}"))).collect(), 3);

        let applied =
            timeline.apply_window((10..13).map(|i| at(i, &format!("m{i:02}"))).collect(), 3);

        assert!(applied.reset);
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline.oldest().unwrap().id(), &Id::from("m10"));
        assert!(!timeline.is_exhausted());
    }

    #[test]
    fn short_window_holds_the_whole_thread() {
        let mut timeline = Timeline::new();
        timeline.apply_window(vec![at(1, "m1"), at(2, "m2")], 25);

        assert!(timeline.is_exhausted());
    }

    #[test]
    fn failing_a_staged_message_keeps_it_visible() {
        let mut timeline = Timeline::new();
        let msg = Message::outgoing(
            "t1".into(),
            "u1".into(),
            "u2".into(),
            Content::Text { text: "x".into() },
        );
        let id = msg.id().clone();
        timeline.stage(msg);

        assert!(timeline.fail(&id, "offline"));
        assert!(timeline.get(&id).unwrap().is_error());
    }
}

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::thread::model::Field;
use crate::thread::service::Ready;
use crate::{thread, user};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// `typing = true` queued, not yet written.
    PendingStart,
    Typing,
}

struct State {
    phase: Phase,
    stop_timer: Option<JoinHandle<()>>,
    /// Bumped on every re-arm; a timer that lost the race does nothing.
    armed: u64,
}

struct Shared {
    state: Arc<Mutex<State>>,
    writes: mpsc::UnboundedSender<bool>,
    idle: Duration,
    cleared: Duration,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self, state: &mut State) {
        if state.phase == Phase::Idle {
            return;
        }
        state.phase = Phase::Idle;
        if self.writes.send(false).is_err() {
            debug!("typing writer is gone");
        }
    }
}

/// Debounced `typing.{me}` publisher.
///
/// The first keystroke with text emits `true`; every keystroke re-arms a
/// single stop timer which emits `false` once input pauses. All writes go
/// through one writer task that drops repeated values, so a burst of
/// keystrokes costs exactly one write of each value.
pub struct TypingPublisher {
    shared: Arc<Shared>,
}

impl TypingPublisher {
    pub fn new(ready: &Ready, repo: thread::Repository, idle: Duration, cleared: Duration) -> Self {
        let state = Arc::new(Mutex::new(State {
            phase: Phase::Idle,
            stop_timer: None,
            armed: 0,
        }));
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(write(
            ready.thread_id().clone(),
            ready.me().clone(),
            repo,
            Arc::clone(&state),
            rx,
        ));

        Self {
            shared: Arc::new(Shared {
                state,
                writes: tx,
                idle,
                cleared,
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// A keystroke; `has_text` tells whether the input still holds text.
    pub fn on_input(&self, has_text: bool) {
        let mut state = self.shared.lock();

        if has_text && state.phase == Phase::Idle {
            state.phase = Phase::PendingStart;
            if self.shared.writes.send(true).is_err() {
                debug!("typing writer is gone");
            }
        }
        if state.phase == Phase::Idle {
            return;
        }

        let delay = if has_text {
            self.shared.idle
        } else {
            self.shared.cleared
        };
        if let Some(timer) = state.stop_timer.take() {
            timer.abort();
        }
        state.armed += 1;
        let armed = state.armed;

        let shared = Arc::clone(&self.shared);
        state.stop_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = shared.lock();
            if state.armed != armed {
                return;
            }
            state.stop_timer = None;
            shared.stop(&mut state);
        }));
    }

    pub fn blur(&self) {
        self.force_idle();
    }

    /// Emits `typing = false` now if anything else was published.
    pub fn force_idle(&self) {
        let mut state = self.shared.lock();
        if let Some(timer) = state.stop_timer.take() {
            timer.abort();
        }
        state.armed += 1;
        self.shared.stop(&mut state);
    }
}

impl Drop for TypingPublisher {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.lock().stop_timer.take() {
            timer.abort();
        }
    }
}

async fn write(
    thread_id: thread::Id,
    me: user::Id,
    repo: thread::Repository,
    state: Arc<Mutex<State>>,
    mut rx: mpsc::UnboundedReceiver<bool>,
) {
    let mut last = None;

    while let Some(typing) = rx.recv().await {
        if last == Some(typing) {
            continue;
        }

        match repo
            .set_field(&thread_id, &Field::Typing(me.clone(), typing))
            .await
        {
            Ok(()) => last = Some(typing),
            Err(e) => warn!("failed to publish typing in thread {thread_id}: {e}"),
        }

        if typing {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.phase == Phase::PendingStart {
                state.phase = Phase::Typing;
            }
        }
    }

    debug!("typing writer of thread {thread_id} stopped");
}

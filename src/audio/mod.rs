use std::collections::HashMap;
use std::time::Duration;

use log::{debug, warn};

use crate::message;

pub type Result<T> = std::result::Result<T, Error>;

/// A rendered audio element.
pub trait Player: Send {
    fn play(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn seek(&mut self, position: Duration);

    /// `None` while the media metadata is unknown.
    fn duration(&self) -> Option<Duration>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Progress {
    pub position: Duration,
    /// 0..=100
    pub percentage: f64,
}

struct Bubble {
    player: Box<dyn Player>,
    position: Duration,
}

impl Bubble {
    fn progress(&self) -> Progress {
        let percentage = match self.player.duration() {
            Some(total) if !total.is_zero() => {
                (self.position.as_secs_f64() / total.as_secs_f64() * 100.0).clamp(0.0, 100.0)
            }
            _ => 0.0,
        };
        Progress {
            position: self.position,
            percentage,
        }
    }
}

/// Owns every registered player and the single playing one.
#[derive(Default)]
pub struct PlaybackController {
    bubbles: HashMap<message::Id, Bubble>,
    playing: Option<message::Id>,
}

impl PlaybackController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: message::Id, player: Box<dyn Player>) {
        if let Some(mut old) = self.bubbles.insert(
            id.clone(),
            Bubble {
                player,
                position: Duration::ZERO,
            },
        ) {
            old.player.pause();
            if self.playing.as_ref() == Some(&id) {
                self.playing = None;
            }
        }
    }

    /// Drops the player; a playing one is paused first.
    pub fn unregister(&mut self, id: &message::Id) {
        if let Some(mut bubble) = self.bubbles.remove(id) {
            bubble.player.pause();
        }
        if self.playing.as_ref() == Some(id) {
            self.playing = None;
        }
    }

    /// Plays `id`, pausing whatever played before, or pauses it when it is
    /// the one playing. Returns whether `id` is playing afterwards.
    pub fn toggle(&mut self, id: &message::Id) -> Result<bool> {
        if !self.bubbles.contains_key(id) {
            return Err(Error::NotRegistered(id.clone()));
        }

        if let Some(current) = self.playing.take() {
            if let Some(bubble) = self.bubbles.get_mut(&current) {
                bubble.player.pause();
            }
            if &current == id {
                debug!("paused audio of {id}");
                return Ok(false);
            }
        }

        let bubble = self
            .bubbles
            .get_mut(id)
            .ok_or_else(|| Error::NotRegistered(id.clone()))?;
        bubble.player.seek(bubble.position);
        if let Err(e) = bubble.player.play() {
            warn!("failed to play audio of {id}: {e}");
            return Err(e);
        }

        self.playing = Some(id.clone());
        Ok(true)
    }

    pub fn on_progress(&mut self, id: &message::Id, position: Duration) {
        if let Some(bubble) = self.bubbles.get_mut(id) {
            bubble.position = position;
        }
    }

    /// Playback reached the end: rewind and release the playing slot.
    pub fn on_ended(&mut self, id: &message::Id) {
        if let Some(bubble) = self.bubbles.get_mut(id) {
            bubble.position = Duration::ZERO;
            bubble.player.seek(Duration::ZERO);
        }
        if self.playing.as_ref() == Some(id) {
            self.playing = None;
        }
    }

    pub fn progress(&self, id: &message::Id) -> Option<Progress> {
        self.bubbles.get(id).map(Bubble::progress)
    }

    pub fn playing(&self) -> Option<&message::Id> {
        self.playing.as_ref()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no player registered for message {0}")]
    NotRegistered(message::Id),
    #[error("playback failed: {0}")]
    Playback(String),
}

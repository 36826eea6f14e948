use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use log::{debug, info, warn};

use crate::message::model::{Content, Listing, Message};
use crate::message::stream::MessageStream;
use crate::message::{self, MediaKind};
use crate::presence::typing::TypingPublisher;
use crate::thread::service::Ready;
use crate::{integration, thread};

use deep_link::DeepLink;
use media::{MediaSender, Upload};

pub mod deep_link;
pub mod media;
pub mod recorder;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Default)]
struct Draft {
    text: String,
    attachment: Option<Listing>,
    deep_link_consumed: bool,
}

/// Draft text, the pending product attachment and the send pipelines of
/// one thread.
pub struct Composer {
    ready: Ready,
    messages: message::Repository,
    threads: thread::Service,
    stream: Arc<MessageStream>,
    typing: Arc<TypingPublisher>,
    media: Arc<MediaSender>,
    draft: Mutex<Draft>,
}

impl Composer {
    pub fn new(
        ready: Ready,
        messages: message::Repository,
        threads: thread::Service,
        stream: Arc<MessageStream>,
        typing: Arc<TypingPublisher>,
        media: Arc<MediaSender>,
    ) -> Self {
        Self {
            ready,
            messages,
            threads,
            stream,
            typing,
            media,
            draft: Mutex::new(Draft::default()),
        }
    }

    fn draft(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn text(&self) -> String {
        self.draft().text.clone()
    }

    pub fn attachment(&self) -> Option<Listing> {
        self.draft().attachment.clone()
    }

    pub fn set_text(&self, text: impl Into<String>) {
        let text = text.into();
        let has_text = !text.trim().is_empty();
        self.draft().text = text;
        self.typing.on_input(has_text);
    }

    pub fn blur(&self) {
        self.typing.blur();
    }

    /// Replaces the pending attachment, if any.
    pub fn attach(&self, listing: Listing) {
        debug!("attaching listing {}", listing.id);
        self.draft().attachment = Some(listing);
    }

    pub fn remove_attachment(&self) -> Option<Listing> {
        self.draft().attachment.take()
    }

    /// Attaches the product the thread was last about.
    pub async fn attach_last_referenced(&self) -> Result<Listing> {
        let listing = self
            .threads
            .referenced_listing(self.ready.thread_id())
            .await?
            .ok_or(Error::NoReferencedListing)?;

        self.attach(listing.clone());
        Ok(listing)
    }

    /// Attaches the linked product and sends it. A thread consumes at most
    /// one deep link; later calls return `None`.
    pub async fn apply_deep_link(&self, link: DeepLink) -> Result<Option<Message>> {
        {
            let mut draft = self.draft();
            if draft.deep_link_consumed {
                debug!("deep link already consumed in thread {}", self.ready.thread_id());
                return Ok(None);
            }
            draft.deep_link_consumed = true;
            draft.attachment = Some(link.into_listing());
        }

        self.send().await.map(Some)
    }

    /// Sends the draft. With a pending attachment the result is a single
    /// product message carrying both the text and the listing.
    pub async fn send(&self) -> Result<Message> {
        let msg = {
            let mut draft = self.draft();
            let text = draft.text.trim().to_owned();
            let content = match draft.attachment.take() {
                Some(listing) => Content::Product {
                    text: (!text.is_empty()).then_some(text),
                    listing,
                },
                None if !text.is_empty() => Content::Text { text },
                None => return Err(Error::EmptyMessage),
            };
            draft.text.clear();

            Message::outgoing(
                self.ready.thread_id().clone(),
                self.ready.me().clone(),
                self.ready.peer().clone(),
                content,
            )
        };

        self.typing.force_idle();
        self.stream.stage(msg.clone()).await;
        self.stream.scroll_to_bottom().await;

        let stored = match self.messages.insert(&msg).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("failed to send message {}: {e}", msg.id());
                self.stream.fail(msg.id(), &e.to_string()).await;
                return Err(e.into());
            }
        };
        self.stream.confirm(stored.clone()).await;

        if let Some(listing) = stored.content().listing() {
            if let Err(e) = self
                .threads
                .reference_listing(self.ready.thread_id(), listing)
                .await
            {
                warn!("failed to record referenced listing: {e}");
            }
        }

        info!("sent {:?} message {}", stored.kind(), stored.id());
        Ok(stored)
    }

    pub async fn send_image(
        &self,
        content: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<Message> {
        self.send_media(MediaKind::Image, content, filename, content_type)
            .await
    }

    pub async fn send_audio(
        &self,
        content: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<Message> {
        self.send_media(MediaKind::Audio, content, filename, content_type)
            .await
    }

    async fn send_media(
        &self,
        kind: MediaKind,
        content: Bytes,
        filename: &str,
        content_type: &str,
    ) -> Result<Message> {
        let upload = Upload {
            content,
            filename: filename.to_owned(),
            content_type: content_type.to_owned(),
        };
        self.media.send(kind, upload).await
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("nothing to send")]
    EmptyMessage,
    #[error("thread has no referenced listing")]
    NoReferencedListing,
    #[error("no recording in progress")]
    NotRecording,
    #[error("recording is empty")]
    EmptyRecording,
    #[error("audio device unavailable: {0}")]
    Device(String),

    #[error(transparent)]
    _Message(#[from] message::Error),
    #[error(transparent)]
    _Thread(#[from] thread::Error),
    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

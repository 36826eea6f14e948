use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use tokio::time;
use url::Url;

use crate::integration::blob::{self, BlobPath};
use crate::message::model::{Message, Patch};
use crate::message::stream::MessageStream;
use crate::message::{self, MediaKind};
use crate::thread::service::Ready;
use crate::{integration, thread, user};

/// Payload of an image or audio message.
#[derive(Clone, Debug)]
pub struct Upload {
    pub content: Bytes,
    pub filename: String,
    pub content_type: String,
}

/// Two-phase media send: placeholder first, payload second, then a patch
/// that always moves the placeholder out of `Uploading`.
pub struct MediaSender {
    thread_id: thread::Id,
    me: user::Id,
    peer: user::Id,
    messages: message::Repository,
    blobs: blob::Storage,
    stream: Arc<MessageStream>,
    timeout: Duration,
}

impl MediaSender {
    pub fn new(
        ready: &Ready,
        messages: message::Repository,
        blobs: blob::Storage,
        stream: Arc<MessageStream>,
        timeout: Duration,
    ) -> Self {
        Self {
            thread_id: ready.thread_id().clone(),
            me: ready.me().clone(),
            peer: ready.peer().clone(),
            messages,
            blobs,
            stream,
            timeout,
        }
    }

    /// Returns the message in its terminal state. An upload failure is part
    /// of the message state, not an error.
    pub async fn send(&self, kind: MediaKind, upload: Upload) -> super::Result<Message> {
        let mut placeholder =
            Message::placeholder(self.thread_id.clone(), self.me.clone(), self.peer.clone(), kind);
        let id = placeholder.id().clone();

        self.stream.stage(placeholder.clone()).await;
        self.stream.scroll_to_bottom().await;

        match self.messages.insert(&placeholder).await {
            Ok(stored) => {
                placeholder = stored.clone();
                self.stream.confirm(stored).await;
            }
            Err(e) => {
                warn!("failed to store placeholder {id}: {e}");
                self.stream.fail(&id, &e.to_string()).await;
                return Err(e.into());
            }
        }

        let path = BlobPath::media(&self.thread_id, kind, &id, &upload.filename);
        let patch = match time::timeout(self.timeout, self.upload(&path, upload)).await {
            Ok(Ok(url)) => Patch::Sent { url },
            Ok(Err(e)) => {
                warn!("failed to upload {path}: {e}");
                Patch::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!("upload of {path} timed out");
                Patch::Failed {
                    reason: integration::Error::Timeout(self.timeout).to_string(),
                }
            }
        };

        match self.messages.patch(&self.thread_id, &id, &patch).await {
            Ok(()) => {
                debug!("media message {id} settled");
                self.stream.patch_local(&id, &patch).await;
                placeholder.apply(&patch);
            }
            Err(e) => {
                warn!("failed to patch media message {id}: {e}");
                let reason = e.to_string();
                self.stream.fail(&id, &reason).await;
                placeholder.fail(reason);
            }
        }

        Ok(self.stream.get(&id).await.unwrap_or(placeholder))
    }

    async fn upload(&self, path: &BlobPath, upload: Upload) -> integration::Result<Url> {
        self.blobs
            .upload(path, upload.content, &upload.content_type)
            .await?;
        self.blobs.resolve_url(path).await
    }
}

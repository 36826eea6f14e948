use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use url::Url;

use crate::{integration, message, thread};

pub type Storage = Arc<dyn BlobStorage + Send + Sync>;

/// Object key of an uploaded blob:
/// `threads/{thread}/{images|audio}/{message}/{filename}`. Each segment is
/// kept apart and percent-encoded on its own when turned into a URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlobPath(Vec<String>);

impl BlobPath {
    pub fn media(
        thread_id: &thread::Id,
        kind: message::MediaKind,
        message_id: &message::Id,
        filename: &str,
    ) -> Self {
        Self(vec![
            String::from("threads"),
            thread_id.to_string(),
            kind.folder().to_owned(),
            message_id.to_string(),
            sanitize(filename),
        ])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Appends the path under `base` without letting any segment escape it.
    pub fn resolve(&self, base: &Url) -> integration::Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| integration::Error::Rejected(format!("{base} cannot hold {self}")))?
            .pop_if_empty()
            .extend(&self.0);
        Ok(url)
    }
}

impl Display for BlobPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

fn sanitize(filename: &str) -> String {
    let name = filename
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect::<String>();

    match name.as_str() {
        "" | "." | ".." => "file".into(),
        _ => name,
    }
}

#[async_trait]
pub trait BlobStorage {
    async fn upload(
        &self,
        path: &BlobPath,
        content: Bytes,
        content_type: &str,
    ) -> integration::Result<()>;

    async fn resolve_url(&self, path: &BlobPath) -> integration::Result<Url>;
}

#[derive(Clone, Debug)]
pub struct Config {
    base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::from("http://127.0.0.1:9000/thread-media/"),
        }
    }
}

impl Config {
    pub fn env() -> Option<Self> {
        match env::var("BLOB_BASE_URL") {
            Ok(base_url) => Some(Self { base_url }),
            Err(_) => {
                warn!("BLOB env is not configured");
                None
            }
        }
    }

    pub fn connect(&self) -> integration::Result<HttpBlobStorage> {
        let mut base = self.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(HttpBlobStorage {
            client,
            base: Url::parse(&base)?,
        })
    }
}

/// Object storage reachable through plain `PUT` uploads and public reads.
#[derive(Clone)]
pub struct HttpBlobStorage {
    client: reqwest::Client,
    base: Url,
}

#[async_trait]
impl BlobStorage for HttpBlobStorage {
    async fn upload(
        &self,
        path: &BlobPath,
        content: Bytes,
        content_type: &str,
    ) -> integration::Result<()> {
        let target = path.resolve(&self.base)?;
        debug!("uploading {} bytes to {target}", content.len());

        self.client
            .put(target)
            .header(CONTENT_TYPE, content_type)
            .body(content)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn resolve_url(&self, path: &BlobPath) -> integration::Result<Url> {
        path.resolve(&self.base)
    }
}

#[derive(Clone, Debug)]
pub struct StoredBlob {
    pub content: Bytes,
    pub content_type: String,
}

/// Process-local blob storage with switchable failure modes.
#[derive(Clone, Default)]
pub struct MemoryBlobStorage {
    blobs: Arc<Mutex<HashMap<BlobPath, StoredBlob>>>,
    failing: Arc<AtomicBool>,
    stalled: Arc<AtomicBool>,
}

impl MemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every following upload is rejected.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every following upload never completes.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::SeqCst);
    }

    pub fn get(&self, path: &BlobPath) -> Option<StoredBlob> {
        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStorage for MemoryBlobStorage {
    async fn upload(
        &self,
        path: &BlobPath,
        content: Bytes,
        content_type: &str,
    ) -> integration::Result<()> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(integration::Error::Unavailable(format!(
                "upload of {path} rejected"
            )));
        }

        self.blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                path.clone(),
                StoredBlob {
                    content,
                    content_type: content_type.to_owned(),
                },
            );
        Ok(())
    }

    async fn resolve_url(&self, path: &BlobPath) -> integration::Result<Url> {
        if self.get(path).is_none() {
            return Err(integration::Error::NotFound(path.to_string()));
        }
        path.resolve(&Url::parse("memory://blobs/")?)
    }
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::{debug, info, warn};
use url::Url;

use crate::audio::PlaybackController;
use crate::composer::Composer;
use crate::composer::deep_link::DeepLink;
use crate::composer::media::MediaSender;
use crate::composer::recorder::{AudioRecorder, Mic};
use crate::error::{Error, Result};
use crate::integration::blob;
use crate::integration::memory::MemoryStore;
use crate::lifecycle::{Generation, Token};
use crate::message::stream::MessageStream;
use crate::message::viewport::{RowMetrics, UniformRows};
use crate::mirror::service::MirrorServiceImpl;
use crate::presence::heartbeat::Heartbeat;
use crate::presence::peer::{PeerMonitor, PeerStatus};
use crate::presence::typing::TypingPublisher;
use crate::thread::service::{Ready, ThreadServiceImpl};
use crate::{message, mirror, presence, thread, user};

pub use config::Config;

pub mod config;
pub mod navigator;

const ROW_HEIGHT: f64 = 56.0;

/// Target of a thread link: `…/threads/{id}?peer=&name=&handle=&photo=`,
/// optionally carrying deep-link product parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub thread_id: thread::Id,
    pub peer: Option<user::Id>,
    /// Warms the header until live data arrives.
    pub hint: user::Hint,
    pub deep_link: Option<DeepLink>,
}

impl Route {
    pub fn parse(url: &Url) -> Result<Self> {
        let invalid = || Error::InvalidRoute(url.to_string());

        let segments = url
            .host_str()
            .into_iter()
            .chain(url.path_segments().into_iter().flatten())
            .collect::<Vec<_>>();
        let thread_id = segments
            .iter()
            .position(|s| *s == "threads")
            .and_then(|i| segments.get(i + 1))
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;

        let mut peer = None;
        let mut hint = user::Hint::default();
        for (key, value) in url.query_pairs() {
            if value.trim().is_empty() {
                continue;
            }
            match &*key {
                "peer" => peer = Some(user::Id::from(value.into_owned())),
                "name" => hint.name = Some(value.into_owned()),
                "handle" => hint.handle = Some(value.into_owned()),
                "photo" => hint.photo = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            thread_id: thread::Id::from(*thread_id),
            peer,
            hint,
            deep_link: DeepLink::from_url(url),
        })
    }
}

/// External collaborators of a session.
#[derive(Clone)]
pub struct Services {
    pub threads: thread::Service,
    pub thread_repo: thread::Repository,
    pub messages: message::Repository,
    pub mirrors: mirror::Service,
    pub blobs: blob::Storage,
    pub presence: presence::Channel,
    pub microphone: Mic,
    pub metrics: Arc<dyn RowMetrics + Send + Sync>,
}

impl Services {
    /// Every store collaborator backed by one [`MemoryStore`].
    pub fn memory(
        store: &MemoryStore,
        blobs: blob::Storage,
        presence: presence::Channel,
        microphone: Mic,
    ) -> Self {
        let thread_repo: thread::Repository = Arc::new(store.clone());
        let mirror_repo: mirror::Repository = Arc::new(store.clone());

        Self {
            threads: Arc::new(ThreadServiceImpl::new(thread_repo.clone())),
            thread_repo,
            messages: Arc::new(store.clone()),
            mirrors: Arc::new(MirrorServiceImpl::new(mirror_repo)),
            blobs,
            presence,
            microphone,
            metrics: Arc::new(UniformRows(ROW_HEIGHT)),
        }
    }
}

/// Everything running for one opened thread. Built only from a resolved
/// [`Ready`], so no component can touch a missing document.
pub struct ThreadSession {
    ready: Ready,
    config: Config,
    stream: Arc<MessageStream>,
    heartbeat: Heartbeat,
    typing: Arc<TypingPublisher>,
    peer: PeerMonitor,
    composer: Composer,
    recorder: AudioRecorder,
    playback: Mutex<PlaybackController>,
}

impl ThreadSession {
    pub async fn open(
        services: &Services,
        config: &Config,
        me: &user::Id,
        route: Route,
        viewport_height: f64,
    ) -> Result<Self> {
        let thread_id = route.thread_id.clone();
        let token = Generation::new().token();
        Self::open_while(services, config, me, route, viewport_height, &token)
            .await?
            .ok_or(Error::Superseded(thread_id))
    }

    /// Opens the thread as long as `token` stays current. Once it goes stale
    /// nothing further is written and whatever was started is closed again.
    pub async fn open_while(
        services: &Services,
        config: &Config,
        me: &user::Id,
        route: Route,
        viewport_height: f64,
        token: &Token,
    ) -> Result<Option<Self>> {
        let ready = services
            .threads
            .resolve(&route.thread_id, me, route.peer.as_ref())
            .await?;

        if !token.is_current() {
            debug!("open of thread {} superseded while resolving", ready.thread_id());
            return Ok(None);
        }

        if let Err(e) = services
            .mirrors
            .mark_read(ready.me(), ready.thread_id(), ready.peer())
            .await
        {
            warn!("failed to reset unread of thread {}: {e}", ready.thread_id());
        }

        let stream = MessageStream::new(
            &ready,
            services.messages.clone(),
            services.mirrors.clone(),
            config.window_size,
            config.page_size,
            services.metrics.clone(),
            viewport_height,
        );
        if let Err(e) = stream.open().await {
            warn!("thread {} opened without live messages: {e}", ready.thread_id());
        }
        if !token.is_current() {
            debug!("open of thread {} superseded while subscribing", ready.thread_id());
            stream.close();
            return Ok(None);
        }

        let heartbeat = Heartbeat::new(&ready, services.thread_repo.clone(), config.heartbeat_interval);
        heartbeat.set_visible(true).await;

        let typing = Arc::new(TypingPublisher::new(
            &ready,
            services.thread_repo.clone(),
            config.typing_idle,
            config.typing_cleared,
        ));
        let peer = PeerMonitor::start(
            &ready,
            services.thread_repo.clone(),
            services.presence.clone(),
            route.hint,
        )
        .await;

        let media = Arc::new(MediaSender::new(
            &ready,
            services.messages.clone(),
            services.blobs.clone(),
            Arc::clone(&stream),
            config.upload_timeout,
        ));
        let composer = Composer::new(
            ready.clone(),
            services.messages.clone(),
            services.threads.clone(),
            Arc::clone(&stream),
            Arc::clone(&typing),
            Arc::clone(&media),
        );
        let recorder = AudioRecorder::new(services.microphone.clone(), media);

        let session = Self {
            ready,
            config: config.clone(),
            stream,
            heartbeat,
            typing,
            peer,
            composer,
            recorder,
            playback: Mutex::new(PlaybackController::new()),
        };

        if !token.is_current() {
            debug!("open of thread {} superseded while starting", session.ready.thread_id());
            session.close().await;
            return Ok(None);
        }

        if let Some(link) = route.deep_link {
            if let Err(e) = session.composer.apply_deep_link(link).await {
                warn!("failed to send deep-linked listing: {e}");
            }
        }

        info!(
            "opened thread {} for {}",
            session.ready.thread_id(),
            session.ready.me()
        );
        Ok(Some(session))
    }

    pub const fn ready(&self) -> &Ready {
        &self.ready
    }

    pub fn stream(&self) -> &Arc<MessageStream> {
        &self.stream
    }

    pub const fn composer(&self) -> &Composer {
        &self.composer
    }

    pub const fn recorder(&self) -> &AudioRecorder {
        &self.recorder
    }

    pub fn playback(&self) -> MutexGuard<'_, PlaybackController> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn peer(&self) -> PeerStatus {
        self.peer.current()
    }

    pub fn peer_updates(&self) -> tokio::sync::watch::Receiver<PeerStatus> {
        self.peer.status()
    }

    pub fn is_peer_active_now(&self) -> bool {
        self.peer
            .current()
            .is_active_now(Utc::now(), self.config.active_window)
    }

    /// The view gained or lost visibility.
    pub async fn set_visible(&self, visible: bool) {
        if !visible {
            self.typing.blur();
        }
        self.heartbeat.set_visible(visible).await;
    }

    /// Stops every task of the session and clears the published fields.
    pub async fn close(&self) {
        self.typing.force_idle();
        self.recorder.cancel().await;
        self.heartbeat.set_visible(false).await;
        self.stream.close();
        info!("closed thread {}", self.ready.thread_id());
    }
}

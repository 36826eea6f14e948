use std::sync::Arc;

use log::debug;
use tokio::sync::Mutex;
use url::Url;

use crate::error::Result;
use crate::lifecycle::Generation;
use crate::user;

use super::{Config, Route, Services, ThreadSession};

pub enum Navigation {
    Opened(Arc<ThreadSession>),
    /// Another navigation started before this one finished. Nothing it
    /// started is left running.
    Superseded,
}

/// Switches between threads. Only the latest navigation may install its
/// session; a slower earlier one is closed and discarded.
pub struct Navigator {
    services: Services,
    config: Config,
    me: user::Id,
    viewport_height: f64,
    generation: Generation,
    current: Mutex<Option<Arc<ThreadSession>>>,
}

impl Navigator {
    pub fn new(services: Services, config: Config, me: user::Id, viewport_height: f64) -> Self {
        Self {
            services,
            config,
            me,
            viewport_height,
            generation: Generation::new(),
            current: Mutex::new(None),
        }
    }

    pub async fn open_url(&self, url: &Url) -> Result<Navigation> {
        self.open(Route::parse(url)?).await
    }

    pub async fn open(&self, route: Route) -> Result<Navigation> {
        let token = self.generation.advance();
        self.close_current().await;

        let thread_id = route.thread_id.clone();
        let Some(session) = ThreadSession::open_while(
            &self.services,
            &self.config,
            &self.me,
            route,
            self.viewport_height,
            &token,
        )
        .await?
        else {
            debug!("navigation to thread {thread_id} superseded");
            return Ok(Navigation::Superseded);
        };

        let mut current = self.current.lock().await;
        if !token.is_current() {
            drop(current);
            debug!("navigation to thread {thread_id} superseded");
            session.close().await;
            return Ok(Navigation::Superseded);
        }

        let session = Arc::new(session);
        *current = Some(Arc::clone(&session));
        Ok(Navigation::Opened(session))
    }

    pub async fn current(&self) -> Option<Arc<ThreadSession>> {
        self.current.lock().await.clone()
    }

    /// Leaves the open thread, abandoning any navigation in flight.
    pub async fn leave(&self) {
        self.generation.advance();
        self.close_current().await;
    }

    async fn close_current(&self) {
        let previous = self.current.lock().await.take();
        if let Some(previous) = previous {
            previous.close().await;
        }
    }
}

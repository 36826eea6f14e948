use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{info, warn};
use url::Url;

use thread_sync::composer::recorder::ScriptedMicrophone;
use thread_sync::integration::blob::{self, MemoryBlobStorage};
use thread_sync::integration::memory::{MemoryPresence, MemoryStore};
use thread_sync::presence::PresenceRecord;
use thread_sync::presence::channel::RedisPresenceChannel;
use thread_sync::session::navigator::{Navigation, Navigator};
use thread_sync::session::{self, Services};
use thread_sync::{integration, presence, user};

#[tokio::main]
async fn main() -> thread_sync::Result<()> {
    integration::init_logger()?;

    let config = session::Config::env();
    let backends = integration::Config::env();
    let store = MemoryStore::new();
    let microphone = ScriptedMicrophone::new(
        vec![Bytes::from_static(b"OggS"), Bytes::from_static(b"voice")],
        "audio/ogg",
        Duration::from_millis(100),
    );

    let presence: presence::Channel = match &backends.redis {
        Some(redis) => Arc::new(RedisPresenceChannel::connect(redis)?),
        None => {
            let memory = MemoryPresence::new();
            memory.set(
                &user::Id::from("bob"),
                Some(PresenceRecord::online(chrono::Utc::now())),
            );
            Arc::new(memory)
        }
    };
    let blobs: blob::Storage = match &backends.blob {
        Some(storage) => Arc::new(storage.connect()?),
        None => Arc::new(MemoryBlobStorage::new()),
    };

    let services = Services::memory(&store, blobs, presence, Arc::new(microphone));
    let navigator = Navigator::new(services, config, user::Id::from("alice"), 640.0);

    let url = Url::parse("app://threads/demo?peer=bob&listing_id=7&name=Oak%20desk&price=120")
        .map_err(integration::Error::from)?;
    let session = match navigator.open_url(&url).await? {
        Navigation::Opened(session) => session,
        Navigation::Superseded => return Ok(()),
    };

    let composer = session.composer();
    composer.set_text("Is it still available?");
    composer.send().await?;
    composer
        .send_image(Bytes::from_static(b"\x89PNG"), "desk.png", "image/png")
        .await?;

    session.recorder().start().await?;
    tokio::time::sleep(Duration::from_millis(250)).await;
    if let Err(e) = session.recorder().finish().await {
        warn!("voice message not sent: {e}");
    }

    for msg in session.stream().messages().await {
        info!("{} {:?} {:?}", msg.id(), msg.kind(), msg.state());
    }
    info!("peer online: {}", session.peer().is_online());

    navigator.leave().await;
    Ok(())
}

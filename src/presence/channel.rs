use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::debug;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::integration::{self, cache};
use crate::user;

use super::PresenceRecord;

/// Presence of one user; the first item is the current record.
pub type PresenceStream =
    Pin<Box<dyn Stream<Item = integration::Result<Option<PresenceRecord>>> + Send>>;

#[async_trait]
pub trait PresenceChannel {
    async fn watch(&self, user: &user::Id) -> integration::Result<PresenceStream>;
}

fn presence_key(user: &user::Id) -> String {
    format!("presence:{user}")
}

/// Follows `presence:{user}` JSON records through keyspace notifications.
#[derive(Clone)]
pub struct RedisPresenceChannel {
    client: redis::Client,
}

impl RedisPresenceChannel {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn connect(config: &cache::Config) -> integration::Result<Self> {
        cache::init_client(config).map(Self::new)
    }
}

async fn read(
    con: &mut MultiplexedConnection,
    key: &str,
) -> integration::Result<Option<PresenceRecord>> {
    let raw: Option<String> = con.get(key).await?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl PresenceChannel for RedisPresenceChannel {
    async fn watch(&self, user: &user::Id) -> integration::Result<PresenceStream> {
        let key = presence_key(user);
        let mut con = self.client.get_multiplexed_async_connection().await?;
        cache::enable_keyspace_events(&mut con).await?;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(cache::keyspace(&key)).await?;

        let stream = async_stream::stream! {
            yield read(&mut con, &key).await;

            let mut events = pubsub.into_on_message();
            while let Some(msg) = events.next().await {
                debug!("received keyspace message on {}", msg.get_channel_name());
                yield read(&mut con, &key).await;
            }
        };

        Ok(Box::pin(stream))
    }
}

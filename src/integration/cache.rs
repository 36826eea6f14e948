use std::env;

use log::warn;

use crate::integration;

#[derive(Clone, Debug)]
pub struct Config {
    host: String,
    port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
        }
    }
}

impl Config {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn env() -> integration::Result<Self> {
        let host = env::var("REDIS_HOST").inspect_err(|_| warn!("REDIS env is not configured"))?;
        let port = env::var("REDIS_PORT")
            .unwrap_or_else(|_| "6379".to_string())
            .parse()?;
        Ok(Self { host, port })
    }

    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}

pub fn init_client(config: &Config) -> integration::Result<redis::Client> {
    redis::Client::open(config.url()).map_err(integration::Error::from)
}

/// Turns on keyspace notifications so value changes can be followed through
/// pub/sub.
pub async fn enable_keyspace_events(
    con: &mut redis::aio::MultiplexedConnection,
) -> integration::Result<()> {
    redis::cmd("CONFIG")
        .arg("SET")
        .arg("notify-keyspace-events")
        .arg("KEA")
        .query_async(con)
        .await
        .map(|_: ()| ())
        .map_err(integration::Error::from)
}

/// Keyspace channel for a single key on database 0.
pub fn keyspace(key: &str) -> String {
    format!("__keyspace@0__:{key}")
}

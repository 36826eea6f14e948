use std::env;
use std::fs::File;
use std::str::FromStr;

use dotenv::dotenv;
use log::LevelFilter;
use simplelog::{ColorChoice, CombinedLogger, TermLogger, TerminalMode, WriteLogger};

pub mod blob;
pub mod cache;
pub mod memory;

pub type Result<T> = std::result::Result<T, Error>;

/// External backends. An unset one is replaced by a process-local store.
#[derive(Clone, Default)]
pub struct Config {
    pub redis: Option<cache::Config>,
    pub blob: Option<blob::Config>,
}

impl Config {
    pub fn env() -> Self {
        dotenv().ok();

        Self {
            redis: cache::Config::env().ok(),
            blob: blob::Config::env(),
        }
    }
}

/// Installs the terminal + file logger. Level comes from `RUST_LOG`, the file
/// name from `SERVICE_NAME`.
pub fn init_logger() -> Result<()> {
    dotenv().ok();

    let rust_log = env::var("RUST_LOG").unwrap_or("info".into());
    let level = LevelFilter::from_str(&rust_log).unwrap_or(LevelFilter::Info);
    let log_file = env::var("SERVICE_NAME")
        .map(|pkg| format!("{pkg}.log"))
        .unwrap_or("thread_sync.log".into());

    CombinedLogger::init(vec![
        TermLogger::new(
            level,
            simplelog::Config::default(),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ),
        WriteLogger::new(level, simplelog::Config::default(), File::create(log_file)?),
    ])?;

    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("write rejected: {0}")]
    Rejected(String),
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    _Env(#[from] env::VarError),
    #[error(transparent)]
    _ParseInt(#[from] std::num::ParseIntError),
    #[error(transparent)]
    _Io(#[from] std::io::Error),
    #[error(transparent)]
    _Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    _Redis(#[from] redis::RedisError),
    #[error(transparent)]
    _Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    _Url(#[from] url::ParseError),
    #[error(transparent)]
    _ParseJson(#[from] serde_json::Error),
}

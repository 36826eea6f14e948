use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;
use log::warn;

pub const WINDOW_SIZE: usize = 25;
pub const PAGE_SIZE: usize = 25;
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
pub const ACTIVE_WINDOW: Duration = Duration::from_secs(60);
pub const TYPING_IDLE: Duration = Duration::from_millis(700);
pub const TYPING_CLEARED: Duration = Duration::from_millis(250);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Timings and sizes of a thread session.
#[derive(Clone, Debug)]
pub struct Config {
    /// Messages kept in the live tail subscription.
    pub window_size: usize,
    /// Messages fetched per backward page.
    pub page_size: usize,
    pub heartbeat_interval: Duration,
    /// How long a peer heartbeat counts as "active now".
    pub active_window: Duration,
    /// Stop-typing delay after the last keystroke.
    pub typing_idle: Duration,
    /// Stop-typing delay once the input is empty.
    pub typing_cleared: Duration,
    pub upload_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            page_size: PAGE_SIZE,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            active_window: ACTIVE_WINDOW,
            typing_idle: TYPING_IDLE,
            typing_cleared: TYPING_CLEARED,
            upload_timeout: UPLOAD_TIMEOUT,
        }
    }
}

impl Config {
    pub fn env() -> Self {
        dotenv().ok();
        let defaults = Self::default();

        Self {
            window_size: var("WINDOW_SIZE").unwrap_or(defaults.window_size),
            page_size: var("PAGE_SIZE").unwrap_or(defaults.page_size),
            heartbeat_interval: var("HEARTBEAT_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            active_window: var("ACTIVE_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.active_window),
            typing_idle: var("TYPING_IDLE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.typing_idle),
            typing_cleared: var("TYPING_CLEARED_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.typing_cleared),
            upload_timeout: var("UPLOAD_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upload_timeout),
        }
    }
}

fn var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring invalid {name}: {raw}");
            None
        }
    }
}

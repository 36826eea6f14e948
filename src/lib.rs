pub mod audio;
pub mod composer;
pub mod error;
pub mod integration;
pub mod lifecycle;
pub mod message;
pub mod mirror;
pub mod presence;
pub mod session;
pub mod thread;
pub mod user;

pub use error::{Error, Result};

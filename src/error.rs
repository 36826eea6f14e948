use crate::{audio, composer, integration, message, mirror, presence, thread};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid thread route: {0}")]
    InvalidRoute(String),

    #[error("opening thread {0} was superseded")]
    Superseded(thread::Id),

    #[error(transparent)]
    _Thread(#[from] thread::Error),
    #[error(transparent)]
    _Message(#[from] message::Error),
    #[error(transparent)]
    _Mirror(#[from] mirror::Error),
    #[error(transparent)]
    _Composer(#[from] composer::Error),
    #[error(transparent)]
    _Audio(#[from] audio::Error),
    #[error(transparent)]
    _Presence(#[from] presence::Error),
    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

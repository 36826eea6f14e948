use std::sync::Arc;

use repository::MirrorRepository;
use service::MirrorService;

use crate::integration;

pub mod model;
pub mod repository;
pub mod service;

pub type Result<T> = std::result::Result<T, Error>;
pub type Repository = Arc<dyn MirrorRepository + Send + Sync>;
pub type Service = Arc<dyn MirrorService + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    _Integration(#[from] integration::Error),
}

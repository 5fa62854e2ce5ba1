//! Service layer
//!
//! The operations handlers delegate to: account promotion, the NIPSA list,
//! group listing/creation/update and subscription preferences. Services take
//! the repository (and search index where needed) explicitly and never touch
//! HTTP types.

pub mod accounts;
pub mod groups;
pub mod nipsa;
pub mod subscriptions;

use thiserror::Error;

use crate::{error::ApiError, search::IndexerError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("User {0} doesn't exist.")]
    NoSuchUser(String),
    #[error("group {0} does not exist")]
    NoSuchGroup(String),
    #[error("group with groupid '{0}' already exists")]
    DuplicateGroupId(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::NoSuchUser(_) | ServiceError::NoSuchGroup(_) => {
                ApiError::NotFound(error.to_string())
            }
            ServiceError::DuplicateGroupId(_) => ApiError::Conflict(error.to_string()),
            ServiceError::Database(error) => ApiError::Database(error),
            ServiceError::Indexer(error) => ApiError::Indexer(error),
        }
    }
}

use thiserror::Error;

use zl_core::connection::model::ConnectionStatus;
use zl_core::ids::InstanceNameError;
use zl_core::ports::errors::{ConnectionStoreError, ProviderError};

/// Failures surfaced by [`LinkOrchestrator`] operations.
///
/// Validation variants are produced before any external call; provider
/// variants mean the local record has already been rolled back to its
/// prior status.
///
/// [`LinkOrchestrator`]: super::LinkOrchestrator
#[derive(Debug, Error)]
pub enum LinkError {
    #[error(transparent)]
    InvalidName(#[from] InstanceNameError),

    #[error("a connection named {0:?} already exists")]
    DuplicateName(String),

    #[error("connection not found")]
    NotFound,

    #[error("operation not allowed while connection is {status:?}")]
    InvalidState { status: ConnectionStatus },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] ConnectionStoreError),
}

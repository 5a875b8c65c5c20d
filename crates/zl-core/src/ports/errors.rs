use thiserror::Error;

/// Failures from the external pairing provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Timeout or connection failure before a response arrived
    #[error("provider network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("provider returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A 2xx response with no usable fields
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Retryable by the polling loop; fatal for one-shot calls.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Http { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStoreError {
    #[error("connection not found")]
    NotFound,

    #[error("a connection named {0:?} already exists")]
    DuplicateName(String),

    #[error("storage error: {0}")]
    Storage(String),
}

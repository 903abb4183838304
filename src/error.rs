use thiserror::Error;

/// Errors surfaced by the store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to serialize cached entity: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("mutation {0} not found")]
    MutationNotFound(i64),
}

/// Errors surfaced by the remote client, already classified by HTTP status.
#[derive(Debug, Error, Clone)]
pub enum RemoteError {
    #[error("not found")]
    NotFound,
    #[error("rate limited")]
    RateLimited,
    #[error("transient error: {0}")]
    Transient(String),
    #[error("server rejected request ({status}): {message}")]
    Permanent { status: u16, message: String },
}

impl RemoteError {
    /// Whether this error should be retried by the flusher.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_) | RemoteError::RateLimited)
    }

    /// The HTTP status this error carries, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::NotFound => Some(404),
            RemoteError::RateLimited => Some(429),
            RemoteError::Permanent { status, .. } => Some(*status),
            RemoteError::Transient(_) => None,
        }
    }
}

/// Errors surfaced while reading or writing the credential store.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("keychain error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no credential configured; run with --setup")]
    Missing,
}

/// Top-level error returned from the binary's startup path.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

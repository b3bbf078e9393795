use thiserror::Error;

/// Error taxonomy for the chat core.
///
/// `Unauthenticated` and `Authorization` are terminal for the attempted
/// request and must never be retried automatically. `Storage` is transient
/// and safe to retry with the same input (pass a `client_token` to keep the
/// retry from double-posting). `Validation` goes back to the UI verbatim.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid message: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("storage failure: {0}")]
    Storage(#[source] anyhow::Error),

    #[error("no authenticated session")]
    Unauthenticated,
}

impl ChatError {
    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        ChatError::Storage(err.into())
    }
}

/// Errors that can occur while talking to the shared cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The call did not complete within the configured timeout.
    #[error("cache call timed out")]
    Timeout,

    /// The cache could not be reached, or the connection dropped.
    #[error("cache connection failed: {0}")]
    Connection(String),

    /// The cache answered with an error.
    #[error("cache backend error: {0}")]
    Backend(String),

    /// The caller passed an argument the cache cannot honour.
    #[error("invalid cache argument: {0}")]
    InvalidArgument(String),
}

impl CacheError {
    /// Returns `true` if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection(_))
    }
}

//! Error type shared by the wait-state tracker.

/// Errors returned by fallible wait-state operations.
///
/// Most operations on a [`WaitContext`](crate::WaitContext) are total; only
/// parsing client endpoints and the byte codec can fail.
#[derive(Debug, thiserror::Error)]
pub enum WaitStateError {
    #[error("invalid client address {endpoint:?}: {reason}")]
    InvalidClientAddress {
        endpoint: String,
        reason: &'static str,
    },
    #[error("failed to encode wait state: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode wait state: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Convenience alias for results carrying a [`WaitStateError`].
pub type Result<T> = std::result::Result<T, WaitStateError>;

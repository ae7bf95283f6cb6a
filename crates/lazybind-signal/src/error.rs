use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors reported by connection management.
///
/// Disconnecting a stale handle is never an error; only operations that need
/// a live registration to act on (blocking, querying the blocked state) fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SignalError {
    #[error("connection is not active (disconnected, or its signal was dropped)")]
    InactiveConnection,
}

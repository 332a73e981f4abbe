use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection failed after {attempts} attempts")]
    ConnectionFailed { attempts: u32 },

    #[error("Subscription to channel '{0}' timed out")]
    SubscriptionTimeout(String),

    #[error("{failed} of {total} subscriptions failed")]
    SubscriptionsFailed { failed: usize, total: usize },
}

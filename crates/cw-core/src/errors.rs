use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the scan engine
/// can make every failure-handling decision in one place.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("media error: {0}")]
    Media(String),

    #[error("delivery error: {0}")]
    Delivery(String),

    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout { what: String, after: Duration },

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn timeout(what: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            after,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

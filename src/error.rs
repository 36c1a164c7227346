//! Unified error type.

use crate::body::BoxError;

/// The error type returned by simlink's fallible operations.
///
/// Application-level failures (404, 502, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: binding a port, reading a body off the wire,
/// building the outbound HTTP client, loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("body: {0}")]
    Body(BoxError),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("logging: {0}")]
    Logging(String),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

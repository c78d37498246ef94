//! Error taxonomy for the measurement pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpeedmarkError {
    /// Client configuration is unusable (e.g. missing server URL).
    /// Fatal to session start; the user must fix the configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The broker's call to the relay credential service failed or
    /// returned malformed credentials. Surfaced as an opaque 500; the
    /// detail is for server-side logs only.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Referrer missing or not in the allow-list.
    #[error("unauthorized")]
    Authorization,

    /// Client-correctable request problem (payload size out of range,
    /// content length over the ceiling).
    #[error("validation error: {0}")]
    Validation(String),

    /// The measurement engine reported a failure mid-session.
    #[error("engine error: {0}")]
    Engine(String),

    /// Metrics store write failure. Non-fatal, logged only.
    #[error("storage error: {0}")]
    Storage(String),
}

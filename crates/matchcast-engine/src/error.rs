//! Error taxonomy for the engine crate — one thiserror enum per component
//! boundary, composed into `anyhow::Error` only at the binary edge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("transient network failure: {0}")]
    Transient(String),
    #[error("malformed event payload: {0}")]
    MalformedPayload(String),
    #[error("missed-events request failed: {0}")]
    CatchUp(String),
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("no audio received within timeout")]
    Timeout,
    #[error("fetch failed: {0}")]
    Fetch(String),
}

#[derive(Debug, Error)]
pub enum MixerError {
    #[error("failed to open audio output device: {0}")]
    Device(String),
    #[error("unsupported output stream configuration: {0}")]
    Config(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to persist checkpoint: {0}")]
    Persist(#[from] matchcast_core::error::PersistError),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to write history clip: {0}")]
    Io(String),
    #[error("failed to append history row: {0}")]
    Row(String),
}

/// Top-level fatal error. Anything reaching this exits the process
/// non-zero before the queue starts consuming.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] matchcast_core::error::ConfigError),
    #[error("audio device error: {0}")]
    AudioDevice(#[from] MixerError),
}

//! Error taxonomy shared by the core types (config validation, checkpoint
//! persistence). Engine-level errors (stream, TTS, mixer) live in
//! matchcast-engine, which depends on this crate but not vice versa.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be greater than 0")]
    MustBePositive { field: &'static str },
    #[error("ducked_ambience_gain ({ducked}) must be less than nominal_ambience_gain ({nominal})")]
    InvalidGainRange { nominal: f32, ducked: f32 },
    #[error("reconnect_initial_ms ({initial}) must not exceed reconnect_max_ms ({max})")]
    InvalidBackoffRange { initial: u64, max: u64 },
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(String),
    #[error("decode error: {0}")]
    Decode(String),
}

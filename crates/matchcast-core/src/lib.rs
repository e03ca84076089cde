//! matchcast-core — pure types, config, and PCM/WAV utilities.
//!
//! No async runtime, no network I/O, no platform audio dependencies — this
//! crate is safe for matchcast-engine, matchcast-cli, and any downstream
//! consumer to depend on without pulling in tokio, cpal, or reqwest.

pub mod config;
pub mod error;
pub mod match_state;
pub mod runtime_state;
pub mod types;
pub mod wav;

pub use config::Config;
pub use error::ConfigError;
pub use match_state::{InningsPhase, MatchState};
pub use runtime_state::RuntimeState;
pub use types::{AdmitOutcome, Event, Intensity, PhaseHint, Priority, PriorityClass};

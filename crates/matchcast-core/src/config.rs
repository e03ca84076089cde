//! Engine configuration surface.
//!
//! A plain, serde-deserializable struct with a sensible `Default`. Loading
//! it from CLI flags and environment variables is matchcast-cli's job; this
//! crate only owns the struct and its validation, not a specific config
//! *source*, so it stays free of a `clap` dependency.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub ws_auth_token: Option<String>,
    pub match_id: Option<String>,
    pub tts_api_key: Option<String>,
    pub tts_voice_id: String,
    pub tts_timeout_seconds: u64,
    pub sample_rate: u32,
    pub nominal_ambience_gain: f32,
    pub ducked_ambience_gain: f32,
    pub duck_ramp_ms: u64,
    pub ambience_path: String,
    pub state_path: String,
    pub audio_history_dir: String,
    pub save_audio: bool,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    pub dedup_capacity: usize,
    pub max_inflight_tts: usize,
    pub history_channel_capacity: usize,
    pub block_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".into(),
            ws_auth_token: None,
            match_id: None,
            tts_api_key: None,
            tts_voice_id: "default".into(),
            tts_timeout_seconds: 8,
            sample_rate: 22_050,
            nominal_ambience_gain: 0.30,
            ducked_ambience_gain: 0.08,
            duck_ramp_ms: 200,
            ambience_path: "assets/ambience.wav".into(),
            state_path: "state/runtime_state.json".into(),
            audio_history_dir: "state/history".into(),
            save_audio: false,
            reconnect_initial_ms: 1_000,
            reconnect_max_ms: 30_000,
            dedup_capacity: 10_000,
            max_inflight_tts: 1,
            history_channel_capacity: 16,
            block_size: 1_024,
        }
    }
}

impl Config {
    /// Structural validation. Returning `Err` here is the fatal,
    /// exit-code-1 path — the queue must never start consuming against a
    /// config that fails this check.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.is_empty() {
            return Err(ConfigError::MissingField("api_base_url"));
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::MustBePositive { field: "sample_rate" });
        }
        if self.block_size == 0 {
            return Err(ConfigError::MustBePositive { field: "block_size" });
        }
        if self.max_inflight_tts == 0 {
            return Err(ConfigError::MustBePositive {
                field: "max_inflight_tts",
            });
        }
        if self.ducked_ambience_gain >= self.nominal_ambience_gain {
            return Err(ConfigError::InvalidGainRange {
                nominal: self.nominal_ambience_gain,
                ducked: self.ducked_ambience_gain,
            });
        }
        if self.reconnect_initial_ms > self.reconnect_max_ms {
            return Err(ConfigError::InvalidBackoffRange {
                initial: self.reconnect_initial_ms,
                max: self.reconnect_max_ms,
            });
        }
        Ok(())
    }

    /// Gain step the ducking controller should take once per mixer block
    /// (not per frame — `DuckingController::tick` is called once per
    /// `block_size`-frame callback) to reach the target gain in
    /// `duck_ramp_ms`, derived once at construction so the hot loop never
    /// divides.
    pub fn duck_step_per_block(&self) -> f32 {
        let gain_span = (self.nominal_ambience_gain - self.ducked_ambience_gain).abs();
        let ramp_frames = (self.duck_ramp_ms as f64 / 1000.0) * self.sample_rate as f64;
        if ramp_frames <= 0.0 {
            return gain_span;
        }
        ((gain_span as f64 * self.block_size as f64) / ramp_frames) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_gain_range() {
        let mut c = Config::default();
        c.nominal_ambience_gain = 0.1;
        c.ducked_ambience_gain = 0.2;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidGainRange { .. })
        ));
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let mut c = Config::default();
        c.sample_rate = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_backoff_initial_above_max() {
        let mut c = Config::default();
        c.reconnect_initial_ms = 60_000;
        c.reconnect_max_ms = 30_000;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::InvalidBackoffRange { .. })
        ));
    }

    #[test]
    fn duck_step_matches_expected_ramp() {
        let c = Config {
            sample_rate: 1000,
            nominal_ambience_gain: 0.30,
            ducked_ambience_gain: 0.08,
            duck_ramp_ms: 200,
            block_size: 100,
            ..Config::default()
        };
        // 200ms at 1000Hz = 200 frames; 100-frame blocks need 2 ticks to
        // cross the 0.22 span, so each block should step half of it.
        let step = c.duck_step_per_block();
        assert!((step - 0.11).abs() < 1e-3, "step={step}");
    }

    #[test]
    fn duck_step_reaches_target_within_ramp_at_default_block_size() {
        let c = Config {
            sample_rate: 22_050,
            nominal_ambience_gain: 0.30,
            ducked_ambience_gain: 0.08,
            duck_ramp_ms: 200,
            ..Config::default()
        };
        let ramp_frames = (c.duck_ramp_ms as f64 / 1000.0) * c.sample_rate as f64;
        let expected_ticks = (ramp_frames / c.block_size as f64).ceil() as usize;
        // At the shipped defaults this should be a handful of blocks, not
        // hundreds - the bug this guards against made it ~1000x too slow.
        assert!(expected_ticks < 10, "expected_ticks={expected_ticks}");
    }
}

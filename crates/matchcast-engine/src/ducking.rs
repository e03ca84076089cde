//! Ducking controller — ramps ambience gain between nominal and ducked
//! levels on `duck()`/`restore()` edges, advancing one step per mixer block.

use matchcast_core::Config;

pub struct DuckingController {
    nominal: f32,
    ducked: f32,
    step_per_block: f32,
    current: f32,
    target: f32,
}

impl DuckingController {
    pub fn new(config: &Config) -> Self {
        Self {
            nominal: config.nominal_ambience_gain,
            ducked: config.ducked_ambience_gain,
            step_per_block: config.duck_step_per_block(),
            current: config.nominal_ambience_gain,
            target: config.nominal_ambience_gain,
        }
    }

    /// Edge-triggered: request the ducked gain. Idempotent while already
    /// ducked or ducking.
    pub fn duck(&mut self) {
        self.target = self.ducked;
    }

    /// Edge-triggered: request the nominal gain back.
    pub fn restore(&mut self) {
        self.target = self.nominal;
    }

    /// Advance `current` toward `target` by at most one step, clamped so it
    /// never overshoots. Called once per mixer block.
    pub fn tick(&mut self) -> f32 {
        if self.current < self.target {
            self.current = (self.current + self.step_per_block).min(self.target);
        } else if self.current > self.target {
            self.current = (self.current - self.step_per_block).max(self.target);
        }
        self.current
    }

    pub fn current_gain(&self) -> f32 {
        self.current
    }

    pub fn is_at_target(&self) -> bool {
        (self.current - self.target).abs() < f32::EPSILON
    }
}

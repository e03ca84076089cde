//! In-memory match lifecycle state: teams, innings phase, one-shot announcement flags.
//!
//! Unlike [`crate::runtime_state::RuntimeState`] this never touches disk —
//! it is rebuilt from upstream whenever `match_id` changes.

/// Innings phase of the match currently being commentated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InningsPhase {
    ToBegin,
    Innings1,
    InningsBreak,
    Innings2,
    Ended,
}

/// Team names and lifecycle flags for the match currently in progress.
#[derive(Debug, Clone)]
pub struct MatchState {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub phase: InningsPhase,
    pub welcomed: bool,
    pub break_announced: bool,
    pub ended_announced: bool,
}

impl MatchState {
    pub fn new(match_id: impl Into<String>, home_team: String, away_team: String) -> Self {
        Self {
            match_id: match_id.into(),
            home_team,
            away_team,
            phase: InningsPhase::ToBegin,
            welcomed: false,
            break_announced: false,
            ended_announced: false,
        }
    }

    /// True if `match_id` differs from the one this state was built for —
    /// the orchestrator resets state entirely rather than patch it in place.
    pub fn belongs_to(&self, match_id: &str) -> bool {
        self.match_id == match_id
    }

    pub fn transition_to(&mut self, phase: InningsPhase) {
        self.phase = phase;
    }

    /// The canonical welcome template, filled with team names. One of the
    /// few exceptions to "text is always upstream-authored": these three
    /// strings are generated by the engine itself for lifecycle boundaries
    /// that have no upstream event of their own.
    pub fn welcome_text(&self) -> String {
        format!(
            "Welcome to this match between {} and {}!",
            self.home_team, self.away_team
        )
    }

    pub fn innings_break_text(&self) -> String {
        "That brings the first innings to a close. Stay with us through the break.".to_string()
    }

    pub fn match_ended_text(&self) -> String {
        format!(
            "And that's the end of the match between {} and {}. Thanks for joining us.",
            self.home_team, self.away_team
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn belongs_to_matches_current_match_id() {
        let state = MatchState::new("m1", "Red".into(), "Blue".into());
        assert!(state.belongs_to("m1"));
        assert!(!state.belongs_to("m2"));
    }

    #[test]
    fn welcome_text_includes_both_teams() {
        let state = MatchState::new("m1", "Red".into(), "Blue".into());
        let text = state.welcome_text();
        assert!(text.contains("Red"));
        assert!(text.contains("Blue"));
    }

    #[test]
    fn flags_start_false() {
        let state = MatchState::new("m1", "Red".into(), "Blue".into());
        assert!(!state.welcomed);
        assert!(!state.break_announced);
        assert!(!state.ended_announced);
        assert_eq!(state.phase, InningsPhase::ToBegin);
    }
}

//! Event, intensity, and priority types shared across the commentary engine.

use serde::{Deserialize, Serialize};

/// One unit of commentary received from upstream.
///
/// Events are immutable once accepted — `text` is the authoritative
/// utterance and is never rewritten by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub match_id: String,
    /// Authoritative text. Field name matches the wire payload (`sentences`).
    #[serde(rename = "sentences")]
    pub text: String,
    pub intensity: Intensity,
    #[serde(default)]
    pub batsman_name: Option<String>,
    /// Preferred classification signal. See [`Event::priority`].
    #[serde(default)]
    pub priority_class: Option<PriorityClass>,
    /// Legacy fallback id, e.g. `special_event_wicket_1700000000`.
    #[serde(default)]
    pub ball_detection_id: Option<String>,
}

impl Event {
    /// Classify this event into a mixer/queue priority.
    ///
    /// The explicit `priority_class` field wins when present. When absent,
    /// falls back to parsing `ball_detection_id` for interoperability with
    /// older publishers: `special_event_announcement_*` maps to
    /// announcement, `special_event_wicket_*` to special, anything else
    /// (including an absent or unparseable id) to normal.
    pub fn priority(&self) -> Priority {
        let class = self.priority_class.unwrap_or_else(|| {
            self.ball_detection_id
                .as_deref()
                .map(classify_legacy_id)
                .unwrap_or(PriorityClass::Normal)
        });
        class.into()
    }
}

fn classify_legacy_id(id: &str) -> PriorityClass {
    if id.starts_with("special_event_announcement_") {
        PriorityClass::Announcement
    } else if id.starts_with("special_event_wicket_") {
        PriorityClass::Special
    } else {
        PriorityClass::Normal
    }
}

/// A match lifecycle boundary signalled by an inbound event's
/// `ball_detection_id`, alongside (and independent of) its priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseHint {
    InningsBreak,
    MatchEnded,
}

impl Event {
    /// Detects an innings-break or match-ended marker using the same
    /// `special_event_<kind>_<timestamp>` convention as the legacy priority
    /// fallback. `None` means this event carries no phase signal, which is
    /// the common case for ordinary ball-by-ball commentary.
    pub fn phase_hint(&self) -> Option<PhaseHint> {
        let id = self.ball_detection_id.as_deref()?;
        if id.starts_with("special_event_innings_break_") {
            Some(PhaseHint::InningsBreak)
        } else if id.starts_with("special_event_match_ended_") {
            Some(PhaseHint::MatchEnded)
        } else {
            None
        }
    }
}

/// Explicit, authoritative classification of an event's importance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Announcement,
    Special,
    Normal,
}

impl From<PriorityClass> for Priority {
    fn from(class: PriorityClass) -> Self {
        match class {
            PriorityClass::Announcement => Priority::SYSTEM,
            PriorityClass::Special => Priority::SPECIAL,
            PriorityClass::Normal => Priority::NORMAL,
        }
    }
}

/// Mixer/queue priority. Smaller is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub u8);

impl Priority {
    pub const SYSTEM: Priority = Priority(0);
    pub const SPECIAL: Priority = Priority(1);
    pub const NORMAL: Priority = Priority(2);
}

/// Delivered commentary intensity, mapped to a 0-10 TTS excitement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Low,
    Normal,
    Medium,
    High,
    Extreme,
}

impl Intensity {
    /// Fixed total mapping from intensity to a 0-10 excitement integer,
    /// used to parametrize TTS voice emotion. Monotonic by construction.
    pub fn excitement(self) -> u8 {
        match self {
            Intensity::Low => 2,
            Intensity::Normal => 5,
            Intensity::Medium => 7,
            Intensity::High => 9,
            Intensity::Extreme => 10,
        }
    }
}

/// Result of offering an event to the queue's dedup/admission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted,
    Duplicate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(priority_class: Option<PriorityClass>, ball_id: Option<&str>) -> Event {
        Event {
            event_id: "e1".into(),
            match_id: "m1".into(),
            text: "Four runs!".into(),
            intensity: Intensity::High,
            batsman_name: None,
            priority_class,
            ball_detection_id: ball_id.map(String::from),
        }
    }

    #[test]
    fn explicit_priority_class_wins_over_legacy_id() {
        let e = event(
            Some(PriorityClass::Normal),
            Some("special_event_wicket_123"),
        );
        assert_eq!(e.priority(), Priority::NORMAL);
    }

    #[test]
    fn legacy_id_announcement_prefix() {
        let e = event(None, Some("special_event_announcement_999"));
        assert_eq!(e.priority(), Priority::SYSTEM);
    }

    #[test]
    fn legacy_id_wicket_prefix() {
        let e = event(None, Some("special_event_wicket_999"));
        assert_eq!(e.priority(), Priority::SPECIAL);
    }

    #[test]
    fn legacy_id_unrecognized_defaults_normal() {
        let e = event(None, Some("ball_42"));
        assert_eq!(e.priority(), Priority::NORMAL);
    }

    #[test]
    fn no_classification_defaults_normal() {
        let e = event(None, None);
        assert_eq!(e.priority(), Priority::NORMAL);
    }

    #[test]
    fn excitement_is_monotonic_in_intensity() {
        let levels = [
            Intensity::Low,
            Intensity::Normal,
            Intensity::Medium,
            Intensity::High,
            Intensity::Extreme,
        ];
        let excitements: Vec<u8> = levels.iter().map(|i| i.excitement()).collect();
        for pair in excitements.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn priority_ordering_smaller_is_more_urgent() {
        assert!(Priority::SYSTEM < Priority::SPECIAL);
        assert!(Priority::SPECIAL < Priority::NORMAL);
    }

    #[test]
    fn phase_hint_detects_innings_break_marker() {
        let e = event(None, Some("special_event_innings_break_1700000000"));
        assert_eq!(e.phase_hint(), Some(PhaseHint::InningsBreak));
    }

    #[test]
    fn phase_hint_detects_match_ended_marker() {
        let e = event(None, Some("special_event_match_ended_1700000000"));
        assert_eq!(e.phase_hint(), Some(PhaseHint::MatchEnded));
    }

    #[test]
    fn phase_hint_is_none_for_ordinary_ball_event() {
        let e = event(None, Some("ball_42"));
        assert_eq!(e.phase_hint(), None);
    }

    #[test]
    fn event_wire_format_deserializes() {
        let json = r#"{
            "event_id": "e1",
            "match_id": "m1",
            "sentences": "Four runs!",
            "intensity": "high",
            "priority_class": "special"
        }"#;
        let e: Event = serde_json::from_str(json).unwrap();
        assert_eq!(e.text, "Four runs!");
        assert_eq!(e.priority(), Priority::SPECIAL);
    }
}

//! Orchestrator — the single consumer loop wiring queue, match state, TTS,
//! and the mixer together.
//!
//! Shaped like `manager.rs`'s lifecycle-owning service struct: one object
//! with an explicit `run`/`stop`, no process-wide mutable state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use matchcast_core::{Event, InningsPhase, MatchState, PhaseHint, Priority};

use crate::history::{HistoryClip, HistorySink};
use crate::mixer::{Mixer, PlaybackResult};
use crate::queue::EventQueue;
use crate::tts::TtsFetcher;

pub struct Orchestrator {
    queue: Arc<EventQueue>,
    mixer: Mixer,
    fetcher: TtsFetcher,
    history: Option<HistorySink>,
    sample_rate: u32,
    match_state: Option<MatchState>,
}

impl Orchestrator {
    pub fn new(
        queue: Arc<EventQueue>,
        mixer: Mixer,
        fetcher: TtsFetcher,
        history: Option<HistorySink>,
        sample_rate: u32,
    ) -> Self {
        Self {
            queue,
            mixer,
            fetcher,
            history,
            sample_rate,
            match_state: None,
        }
    }

    /// Consume events until the queue closes or `shutdown` fires.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                e = self.queue.next() => e,
                _ = shutdown.cancelled() => None,
            };

            let Some(event) = event else {
                info!("orchestrator: queue closed, shutting down");
                return;
            };

            self.handle_match_boundary(&event).await;
            self.dispatch(event).await;
        }
    }

    /// Reset match state on a new `match_id` and inject the welcome
    /// announcement exactly once. Team names are not available from the
    /// event payload (a full match-metadata service is an external
    /// collaborator this core never calls), so a generic placeholder is
    /// used; a richer integration can replace this with a real lookup.
    async fn handle_match_boundary(&mut self, event: &Event) {
        let needs_reset = match &self.match_state {
            Some(state) => !state.belongs_to(&event.match_id),
            None => true,
        };

        if needs_reset {
            let state = MatchState::new(event.match_id.clone(), "Home".into(), "Away".into());
            self.match_state = Some(state);
        }

        if let Some(state) = self.match_state.as_mut() {
            if !state.welcomed {
                let text = state.welcome_text();
                state.welcomed = true;
                state.transition_to(InningsPhase::Innings1);
                self.speak_announcement(&event.match_id, &text).await;
                return;
            }
        }

        self.handle_phase_hint(event).await;
    }

    /// Advance innings phase off the `special_event_innings_break_*` /
    /// `special_event_match_ended_*` markers upstream sends alongside
    /// ordinary events — the only in-band phase signal this core has,
    /// since a full match-metadata service is an external collaborator.
    /// The inbound event that carried the marker still plays normally
    /// afterward; the announcement is injected ahead of it.
    async fn handle_phase_hint(&mut self, event: &Event) {
        let Some(state) = self.match_state.as_mut() else {
            return;
        };

        match event.phase_hint() {
            Some(PhaseHint::InningsBreak) if !state.break_announced => {
                let text = state.innings_break_text();
                state.break_announced = true;
                state.transition_to(InningsPhase::InningsBreak);
                self.speak_announcement(&event.match_id, &text).await;
            }
            Some(PhaseHint::MatchEnded) if !state.ended_announced => {
                let text = state.match_ended_text();
                state.ended_announced = true;
                state.transition_to(InningsPhase::Ended);
                self.speak_announcement(&event.match_id, &text).await;
            }
            None if state.phase == InningsPhase::InningsBreak => {
                // The first ordinary event after a break implicitly signals
                // resumption; there is no dedicated "resume" marker.
                state.transition_to(InningsPhase::Innings2);
            }
            _ => {}
        }
    }

    async fn speak_announcement(&self, match_id: &str, text: &str) {
        let synthetic_id = format!("announcement_{}_{}", match_id, chrono::Utc::now().timestamp());
        self.play(synthetic_id.clone(), match_id.to_string(), text.to_string(), Priority::SYSTEM, 5)
            .await;
        // Announcements commit as soon as they're submitted.
        if let Err(e) = self.queue.commit(&synthetic_id, match_id).await {
            warn!("orchestrator: failed to commit announcement checkpoint: {e}");
        }
    }

    async fn dispatch(&self, event: Event) {
        let priority = event.priority();
        let excitement = event.intensity.excitement();
        let event_id = event.event_id.clone();
        let match_id = event.match_id.clone();
        let text = event.text.clone();

        let frames_played = self
            .play(event_id.clone(), match_id.clone(), text, priority, excitement)
            .await;

        match frames_played {
            PlayOutcome::TimedOut => {
                // Committed immediately so it is never retried on restart.
                if let Err(e) = self.queue.commit(&event_id, &match_id).await {
                    warn!("orchestrator: failed to commit timed-out event: {e}");
                }
            }
            PlayOutcome::Played { frames } if frames > 0 => {
                if let Err(e) = self.queue.commit(&event_id, &match_id).await {
                    warn!("orchestrator: failed to commit event: {e}");
                }
            }
            PlayOutcome::Played { .. } => {
                info!("orchestrator: {event_id} preempted before any frame played, dropping");
            }
        }
    }

    /// Fetch + submit one utterance to the mixer; returns the outcome used
    /// to decide whether the checkpoint advances.
    async fn play(
        &self,
        event_id: String,
        match_id: String,
        text: String,
        priority: Priority,
        excitement: u8,
    ) -> PlayOutcome {
        let stream = match self.fetcher.synthesize(&text, excitement).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("orchestrator: tts failed for {event_id}: {e}");
                return PlayOutcome::TimedOut;
            }
        };

        let done_rx = self.mixer.submit(priority, stream);
        let result = done_rx.await.unwrap_or(PlaybackResult {
            frames_played: 0,
            samples: Vec::new(),
        });

        if let Some(history) = &self.history {
            if result.frames_played > 0 {
                history.submit(HistoryClip {
                    event_id: event_id.clone(),
                    match_id,
                    samples: result.samples,
                    sample_rate: self.sample_rate,
                    channels: 2,
                });
            }
        }

        PlayOutcome::Played {
            frames: result.frames_played,
        }
    }
}

enum PlayOutcome {
    Played { frames: u64 },
    TimedOut,
}

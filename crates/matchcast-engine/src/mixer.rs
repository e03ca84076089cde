//! Audio mixer / output — owns the device and the realtime callback.
//!
//! Device setup: host → default device → supported config → dedicated OS
//! thread, since the stream is `!Send` on some platforms. The callback
//! itself touches only `try_lock`able cells — on a lock miss it reuses last
//! block's state rather than blocking the realtime thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::warn;

use matchcast_core::{Config, Priority};

use crate::ambience::AmbienceLoop;
use crate::ducking::DuckingController;
use crate::error::MixerError;
use crate::tts::PcmStream;

/// What a submission resolves with once its mixer slot is vacated.
pub struct PlaybackResult {
    pub frames_played: u64,
    /// The mixed output (TTS + ducked ambience) captured across this slot's
    /// span, stereo-interleaved. Empty unless `save_audio` is enabled.
    pub samples: Vec<i16>,
}

/// A submitted TTS buffer awaiting or undergoing playback.
struct ActiveSlot {
    priority: Priority,
    stream: PcmStream,
    frames_played: u64,
    /// Accumulates the mixed block output while this slot is active, when
    /// the engine is configured to save audio history. `None` otherwise, so
    /// the common case never grows a buffer nobody reads.
    capture: Option<Vec<i16>>,
    /// Fired once with the playback result when the slot drains or is preempted.
    done_tx: Option<tokio::sync::oneshot::Sender<PlaybackResult>>,
}

struct PendingSlot {
    priority: Priority,
    sequence: u64,
    stream: PcmStream,
    done_tx: tokio::sync::oneshot::Sender<PlaybackResult>,
}

struct MixerState {
    ambience: AmbienceLoop,
    ducking: DuckingController,
    active: Option<ActiveSlot>,
    pending: Vec<PendingSlot>,
    capture_history: bool,
    /// Scratch buffers reused every block so the realtime callback never
    /// allocates in the steady state.
    ambience_scratch: Vec<i16>,
    tts_scratch: Vec<i16>,
}

/// Handle used to submit TTS buffers and control mixer lifecycle. The
/// realtime callback holds the other end of the same `Mutex`, always via
/// `try_lock`.
#[derive(Clone)]
pub struct Mixer {
    state: Arc<Mutex<MixerState>>,
    sequence: Arc<std::sync::atomic::AtomicU64>,
    running: Arc<AtomicBool>,
}

pub struct MixerHandle {
    _stream: cpal::Stream,
}

impl Mixer {
    pub fn new(config: &Config) -> Self {
        let channels = 2u16;
        let ambience = AmbienceLoop::load(std::path::Path::new(&config.ambience_path), channels);
        if ambience.is_silent() {
            warn!("mixer: ambience channel is silent (missing or undecodable asset)");
        }
        let block_samples = config.block_size * channels as usize;
        Self {
            state: Arc::new(Mutex::new(MixerState {
                ambience,
                ducking: DuckingController::new(config),
                active: None,
                pending: Vec::new(),
                capture_history: config.save_audio,
                ambience_scratch: vec![0i16; block_samples],
                tts_scratch: vec![0i16; config.block_size],
            })),
            sequence: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Open the default output device and start the realtime callback.
    /// The returned `MixerHandle` must be kept alive for the duration of
    /// playback — dropping it stops the stream.
    pub fn start(&self, config: &Config) -> Result<MixerHandle, MixerError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MixerError::Device("no default output device".into()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| MixerError::Config(e.to_string()))?;

        let mut stream_config: cpal::StreamConfig = supported.into();
        stream_config.channels = 2;
        stream_config.sample_rate = cpal::SampleRate(config.sample_rate);
        stream_config.buffer_size = cpal::BufferSize::Fixed(config.block_size as u32);

        let state = self.state.clone();
        let running = self.running.clone();

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0);
                        return;
                    }
                    render_block(&state, data);
                },
                |err| warn!("mixer: output stream error: {err}"),
                None,
            )
            .map_err(|e| MixerError::Config(e.to_string()))?;

        stream.play().map_err(|e| MixerError::Device(e.to_string()))?;
        Ok(MixerHandle { _stream: stream })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Submit a TTS buffer. Resolves the preemption protocol: a strictly
    /// higher priority than the active slot preempts immediately;
    /// otherwise it queues behind the active slot in priority/arrival order.
    /// Returns a future that resolves with the frames actually played (and,
    /// when audio history is enabled, the mixed samples captured) once the
    /// slot drains or is displaced.
    pub fn submit(
        &self,
        priority: Priority,
        stream: PcmStream,
    ) -> tokio::sync::oneshot::Receiver<PlaybackResult> {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let mut state = self.state.lock().expect("mixer state poisoned");

        let should_preempt = match &state.active {
            Some(active) => priority < active.priority,
            None => true,
        };

        if should_preempt {
            let displaced = state.active.take();
            let capture = state.capture_history.then(Vec::new);
            state.active = Some(ActiveSlot {
                priority,
                stream,
                frames_played: 0,
                capture,
                done_tx: Some(done_tx),
            });
            state.ducking.duck();
            if let Some(mut displaced) = displaced {
                let result = PlaybackResult {
                    frames_played: displaced.frames_played,
                    samples: displaced.capture.take().unwrap_or_default(),
                };
                if let Some(tx) = displaced.done_tx.take() {
                    let _ = tx.send(result);
                }
            }
        } else {
            let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
            state.pending.push(PendingSlot {
                priority,
                sequence,
                stream,
                done_tx,
            });
            state.pending.sort_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| a.sequence.cmp(&b.sequence))
            });
        }

        done_rx
    }
}

const FRAMES_PER_BLOCK_CHANNELS: usize = 2;

/// Mix one callback block: ambience (gain-applied) plus any active TTS
/// buffer, saturating-added into `i16`. This is the realtime hot path —
/// the scratch buffers are preallocated in `MixerState` and only resized if
/// the callback's buffer length ever changes (it shouldn't, given a fixed
/// `cpal::BufferSize`), so the steady-state path performs no allocation.
fn render_block(state: &Arc<Mutex<MixerState>>, out: &mut [i16]) {
    let mut guard = match state.try_lock() {
        Ok(g) => g,
        Err(_) => {
            // Stale-state fallback: emit silence for this block rather than
            // block the realtime thread.
            out.fill(0);
            return;
        }
    };

    let MixerState {
        ambience,
        ducking,
        active,
        pending,
        capture_history,
        ambience_scratch,
        tts_scratch,
    } = &mut *guard;

    if ambience_scratch.len() != out.len() {
        ambience_scratch.resize(out.len(), 0);
    }
    ambience.fill(ambience_scratch);

    let gain = ducking.tick();
    for (slot, sample) in out.iter_mut().zip(ambience_scratch.iter()) {
        *slot = ((*sample as f32) * gain) as i16;
    }

    let frame_count = out.len() / FRAMES_PER_BLOCK_CHANNELS;
    if tts_scratch.len() != frame_count {
        tts_scratch.resize(frame_count, 0);
    }

    let mut active_result: Option<PlaybackResult> = None;
    let mut active_tx = None;

    if let Some(slot) = active.as_mut() {
        let written = slot.stream.pull(tts_scratch);
        slot.frames_played += written as u64;

        for i in 0..written {
            let frame_idx = i * FRAMES_PER_BLOCK_CHANNELS;
            for ch in 0..FRAMES_PER_BLOCK_CHANNELS {
                let idx = frame_idx + ch;
                if idx < out.len() {
                    out[idx] = out[idx].saturating_add(tts_scratch[i]);
                }
            }
        }

        if let Some(capture) = slot.capture.as_mut() {
            capture.extend_from_slice(out);
        }

        if slot.stream.is_exhausted() {
            active_result = Some(PlaybackResult {
                frames_played: slot.frames_played,
                samples: slot.capture.take().unwrap_or_default(),
            });
            active_tx = slot.done_tx.take();
        }
    }

    if let Some(result) = active_result {
        *active = None;
        if let Some(tx) = active_tx {
            let _ = tx.send(result);
        }

        if !pending.is_empty() {
            let next = pending.remove(0);
            *active = Some(ActiveSlot {
                priority: next.priority,
                stream: next.stream,
                frames_played: 0,
                capture: (*capture_history).then(Vec::new),
                done_tx: Some(next.done_tx),
            });
        } else {
            ducking.restore();
        }
    }

    if active.is_none() && pending.is_empty() {
        ducking.restore();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn test_state() -> Arc<Mutex<MixerState>> {
        let config = Config {
            sample_rate: 1000,
            duck_ramp_ms: 10,
            ..Config::default()
        };
        Arc::new(Mutex::new(MixerState {
            ambience: AmbienceLoop::load(std::path::Path::new("/nonexistent"), 2),
            ducking: DuckingController::new(&config),
            active: None,
            pending: Vec::new(),
            capture_history: false,
            ambience_scratch: Vec::new(),
            tts_scratch: Vec::new(),
        }))
    }

    fn make_stream(samples: Vec<i16>) -> PcmStream {
        let (tx, rx) = mpsc::channel();
        tx.send(crate::tts::PcmChunk::Data(samples)).unwrap();
        tx.send(crate::tts::PcmChunk::Done).unwrap();
        PcmStream::new(rx)
    }

    #[test]
    fn silent_ambience_with_no_active_slot_emits_zero() {
        let state = test_state();
        let mut out = vec![1i16; 16];
        render_block(&state, &mut out);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn active_slot_is_mixed_into_output() {
        let state = test_state();
        {
            let mut guard = state.lock().unwrap();
            guard.active = Some(ActiveSlot {
                priority: Priority::NORMAL,
                stream: make_stream(vec![100, 200, 300, 400]),
                frames_played: 0,
                capture: None,
                done_tx: None,
            });
        }
        let mut out = vec![0i16; 8]; // 4 stereo frames
        render_block(&state, &mut out);
        assert_eq!(out[0], 100);
        assert_eq!(out[2], 200);
    }

    #[test]
    fn repeated_blocks_reuse_scratch_buffers_without_reallocating() {
        let state = test_state();
        let mut out = vec![0i16; 8];
        render_block(&state, &mut out);
        let (ambience_cap, tts_cap) = {
            let guard = state.lock().unwrap();
            (guard.ambience_scratch.capacity(), guard.tts_scratch.capacity())
        };
        for _ in 0..50 {
            render_block(&state, &mut out);
        }
        let guard = state.lock().unwrap();
        assert_eq!(guard.ambience_scratch.capacity(), ambience_cap);
        assert_eq!(guard.tts_scratch.capacity(), tts_cap);
    }

    #[test]
    fn submit_with_history_enabled_captures_mixed_samples_and_preempts_cleanly() {
        let config = Config {
            sample_rate: 1000,
            duck_ramp_ms: 10,
            save_audio: true,
            ..Config::default()
        };
        let state = Arc::new(Mutex::new(MixerState {
            ambience: AmbienceLoop::load(std::path::Path::new("/nonexistent"), 2),
            ducking: DuckingController::new(&config),
            active: None,
            pending: Vec::new(),
            capture_history: true,
            ambience_scratch: Vec::new(),
            tts_scratch: Vec::new(),
        }));

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        {
            let mut guard = state.lock().unwrap();
            guard.active = Some(ActiveSlot {
                priority: Priority::NORMAL,
                stream: make_stream(vec![10, 20]),
                frames_played: 0,
                capture: Some(Vec::new()),
                done_tx: Some(tx),
            });
        }

        let mut out = vec![0i16; 4]; // 2 stereo frames
        render_block(&state, &mut out);

        let result = rx.try_recv().expect("slot drained this block");
        assert_eq!(result.frames_played, 2);
        assert_eq!(result.samples, out);
    }
}

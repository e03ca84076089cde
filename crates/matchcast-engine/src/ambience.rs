//! Ambience loop — a decoded PCM bed played continuously into the mixer.
//!
//! Loaded once into an owned buffer and read with a wrapping cursor
//! (pointer-wrap strategy): no allocation on the hot path, and no per-loop
//! restart. A short linear cross-fade is applied once at load time across
//! the wrap point to mask an accidental seam in the source file.

use std::path::Path;

use tracing::warn;

use matchcast_core::wav::decode_wav;

/// Cross-fade window applied once across the loop seam, in milliseconds.
const FADE_MS: u32 = 20;

pub struct AmbienceLoop {
    samples: Vec<i16>,
    cursor: usize,
}

impl AmbienceLoop {
    /// Load `path` as a stereo (or mono, expanded to stereo) PCM bed.
    ///
    /// A missing or undecodable file is not fatal — the engine runs with a
    /// silent ambience channel and a `warn` is emitted.
    pub fn load(path: &Path, channels: u16) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => match decode_wav(&bytes) {
                Ok((header, mut samples)) => {
                    if header.channels == 1 && channels == 2 {
                        samples = duplicate_to_stereo(&samples);
                    }
                    apply_seam_crossfade(&mut samples, header.sample_rate, channels, FADE_MS);
                    Self { samples, cursor: 0 }
                }
                Err(e) => {
                    warn!("ambience: failed to decode {}: {e}", path.display());
                    Self::silent()
                }
            },
            Err(e) => {
                warn!("ambience: failed to read {}: {e}", path.display());
                Self::silent()
            }
        }
    }

    fn silent() -> Self {
        Self {
            samples: Vec::new(),
            cursor: 0,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fill `out` with `out.len()` interleaved samples, wrapping the read
    /// cursor modularly. Called once per mixer block — must not allocate.
    pub fn fill(&mut self, out: &mut [i16]) {
        if self.samples.is_empty() {
            out.fill(0);
            return;
        }
        let len = self.samples.len();
        for slot in out.iter_mut() {
            *slot = self.samples[self.cursor];
            self.cursor += 1;
            if self.cursor >= len {
                self.cursor = 0;
            }
        }
    }
}

fn duplicate_to_stereo(mono: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(mono.len() * 2);
    for &s in mono {
        out.push(s);
        out.push(s);
    }
    out
}

/// Blend the tail of the buffer into the head over `fade_ms`, so the
/// wrap-around point in [`fill`] doesn't click.
fn apply_seam_crossfade(samples: &mut [i16], sample_rate: u32, channels: u16, fade_ms: u32) {
    let frame_len = channels.max(1) as usize;
    let fade_frames = ((fade_ms as u64 * sample_rate as u64) / 1000) as usize;
    let total_frames = samples.len() / frame_len;
    let fade_frames = fade_frames.min(total_frames / 2);
    if fade_frames == 0 {
        return;
    }

    for i in 0..fade_frames {
        let t = i as f32 / fade_frames as f32;
        let head_frame = i * frame_len;
        let tail_frame = (total_frames - fade_frames + i) * frame_len;
        for ch in 0..frame_len {
            let head = samples[head_frame + ch] as f32;
            let tail = samples[tail_frame + ch] as f32;
            let blended = tail * (1.0 - t) + head * t;
            samples[tail_frame + ch] = blended.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_silent_loop() {
        let mut amb = AmbienceLoop::load(Path::new("/nonexistent/ambience.wav"), 2);
        assert!(amb.is_silent());
        let mut out = [1i16; 8];
        amb.fill(&mut out);
        assert_eq!(out, [0i16; 8]);
    }

    #[test]
    fn fill_wraps_cursor() {
        let mut amb = AmbienceLoop {
            samples: vec![1, 2, 3, 4],
            cursor: 0,
        };
        let mut out = [0i16; 6];
        amb.fill(&mut out);
        assert_eq!(out, [1, 2, 3, 4, 1, 2]);
    }

    #[test]
    fn duplicate_to_stereo_interleaves() {
        assert_eq!(duplicate_to_stereo(&[10, 20]), vec![10, 10, 20, 20]);
    }

    #[test]
    fn crossfade_is_noop_on_short_buffer() {
        let mut samples = vec![100, -100];
        apply_seam_crossfade(&mut samples, 22_050, 2, 20);
        assert_eq!(samples, vec![100, -100]);
    }
}

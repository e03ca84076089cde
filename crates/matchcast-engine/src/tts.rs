//! TTS fetcher — text + excitement → streamed PCM, consumed by the mixer.
//!
//! One `tokio::spawn`ed task streams the provider response via
//! `bytes_stream()` and decodes it into `i16` PCM, carrying an odd trailing
//! byte across chunk boundaries rather than ever emitting a half sample.
//! There is no playback thread on this end of the channel — the mixer's
//! realtime callback pulls frames out of [`PcmStream`] directly.

use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::Duration;

use futures_util::StreamExt;
use matchcast_core::Config;
use tracing::{debug, error};

use crate::error::TtsError;

/// A chunk of PCM handed from the fetch task to the mixer.
pub enum PcmChunk {
    Data(Vec<i16>),
    Done,
}

/// Channel-backed cursor the mixer pulls frames from. Never blocks: a miss
/// just means no new data arrived yet this block.
pub struct PcmStream {
    rx: Receiver<PcmChunk>,
    buffer: std::collections::VecDeque<i16>,
    finished: bool,
}

impl PcmStream {
    pub(crate) fn new(rx: Receiver<PcmChunk>) -> Self {
        Self {
            rx,
            buffer: std::collections::VecDeque::with_capacity(8192),
            finished: false,
        }
    }

    /// Drain whatever has arrived since the last call. Never blocks.
    fn drain_available(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(PcmChunk::Data(samples)) => self.buffer.extend(samples),
                Ok(PcmChunk::Done) => {
                    self.finished = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    break;
                }
            }
        }
    }

    /// Pop up to `n` mono samples into `out`, returning how many were
    /// written. Called from the mixer's realtime callback — must not block.
    pub fn pull(&mut self, out: &mut [i16]) -> usize {
        self.drain_available();
        let mut written = 0;
        while written < out.len() {
            match self.buffer.pop_front() {
                Some(s) => {
                    out[written] = s;
                    written += 1;
                }
                None => break,
            }
        }
        written
    }

    /// True once the fetch has signalled completion and the local buffer
    /// has been fully drained by the mixer.
    pub fn is_exhausted(&mut self) -> bool {
        self.drain_available();
        self.finished && self.buffer.is_empty()
    }
}

pub struct TtsFetcher {
    client: reqwest::Client,
    api_base_url: String,
    api_key: Option<String>,
    voice_id: String,
    timeout: Duration,
}

impl TtsFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: config.api_base_url.clone(),
            api_key: config.tts_api_key.clone(),
            voice_id: config.tts_voice_id.clone(),
            timeout: Duration::from_secs(config.tts_timeout_seconds),
        }
    }

    /// Begin streaming synthesis for `text` at the given `excitement`
    /// (0-10, see [`matchcast_core::Intensity::excitement`]). Returns a
    /// [`PcmStream`] as soon as the first sample is available, or
    /// `TtsError::Timeout` if none arrives within the configured deadline.
    pub async fn synthesize(&self, text: &str, excitement: u8) -> Result<PcmStream, TtsError> {
        let url = format!("{}/v1/audio/speech", self.api_base_url);
        let body = serde_json::json!({
            "input": text,
            "voice": self.voice_id,
            "style": excitement_to_style(excitement),
            "response_format": "pcm",
            "stream": true,
        });

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = tokio::time::timeout(self.timeout, req.send())
            .await
            .map_err(|_| TtsError::Timeout)?
            .map_err(|e| TtsError::Fetch(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(TtsError::Fetch(format!("provider returned {status}")));
        }

        let mut stream = resp.bytes_stream();
        let (tx, rx) = std::sync::mpsc::channel();

        // Block on the first chunk under the deadline so a dead stream is
        // detected as a timeout rather than handed to the mixer as silence.
        let first = tokio::time::timeout(self.timeout, stream.next())
            .await
            .map_err(|_| TtsError::Timeout)?;

        let mut leftover = match first {
            Some(Ok(chunk)) => {
                let (samples, leftover) = bytes_to_i16(&chunk, None);
                if !samples.is_empty() {
                    let _ = tx.send(PcmChunk::Data(samples));
                }
                leftover
            }
            Some(Err(e)) => return Err(TtsError::Fetch(e.to_string())),
            None => return Err(TtsError::Timeout),
        };

        tokio::spawn(drain_remaining(stream, tx, leftover.take()));

        Ok(PcmStream::new(rx))
    }
}

async fn drain_remaining(
    mut stream: impl futures_util::Stream<Item = reqwest::Result<bytes::Bytes>> + Unpin,
    tx: Sender<PcmChunk>,
    mut leftover: Option<u8>,
) {
    let mut total_samples = 0usize;
    while let Some(chunk_result) = stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(e) => {
                error!("tts: stream error: {e}");
                break;
            }
        };
        let (samples, lo) = bytes_to_i16(&chunk, leftover.take());
        leftover = lo;
        total_samples += samples.len();
        if !samples.is_empty() && tx.send(PcmChunk::Data(samples)).is_err() {
            return;
        }
    }
    debug!("tts: fetch complete, {total_samples} samples");
    let _ = tx.send(PcmChunk::Done);
}

/// Maps 0-10 excitement to a provider-specific style parameter. Monotonic
/// by construction.
fn excitement_to_style(excitement: u8) -> f32 {
    (excitement.min(10) as f32) / 10.0
}

/// Convert raw bytes to i16 PCM samples (little-endian), carrying an odd
/// trailing byte forward rather than discarding it.
fn bytes_to_i16(bytes: &[u8], leftover: Option<u8>) -> (Vec<i16>, Option<u8>) {
    let mut data: Vec<u8>;
    let slice = if let Some(lo) = leftover {
        data = Vec::with_capacity(1 + bytes.len());
        data.push(lo);
        data.extend_from_slice(bytes);
        &data[..]
    } else {
        bytes
    };

    let mut samples = Vec::with_capacity(slice.len() / 2);
    for pair in slice.chunks_exact(2) {
        samples.push(i16::from_le_bytes([pair[0], pair[1]]));
    }

    let remainder = if slice.len() % 2 == 1 {
        Some(slice[slice.len() - 1])
    } else {
        None
    };

    (samples, remainder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_i16_basic() {
        let bytes = [0x01, 0x00, 0xFF, 0x7F];
        let (samples, lo) = bytes_to_i16(&bytes, None);
        assert_eq!(samples, vec![1, 32767]);
        assert_eq!(lo, None);
    }

    #[test]
    fn bytes_to_i16_carries_leftover_across_chunks() {
        let (samples, lo) = bytes_to_i16(&[0x01, 0x00, 0xFF], None);
        assert_eq!(samples, vec![1]);
        assert_eq!(lo, Some(0xFF));

        let (samples, lo) = bytes_to_i16(&[0x7F, 0x02, 0x00], lo);
        assert_eq!(samples, vec![32767, 2]);
        assert_eq!(lo, None);
    }

    #[test]
    fn excitement_to_style_is_monotonic() {
        let values: Vec<f32> = (0..=10).map(excitement_to_style).collect();
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn pcm_stream_pulls_available_then_reports_short_read() {
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(PcmChunk::Data(vec![1, 2, 3])).unwrap();
        let mut stream = PcmStream::new(rx);

        let mut out = [0i16; 5];
        let n = stream.pull(&mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn pcm_stream_exhausted_after_done_and_drain() {
        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(PcmChunk::Data(vec![1])).unwrap();
        tx.send(PcmChunk::Done).unwrap();
        let mut stream = PcmStream::new(rx);

        let mut out = [0i16; 1];
        assert_eq!(stream.pull(&mut out), 1);
        assert!(stream.is_exhausted());
    }
}

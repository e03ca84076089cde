//! Audio history sink — best-effort WAV + JSONL sidecar writer.
//!
//! A full channel drops the item and logs rather than blocking the
//! orchestrator.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use matchcast_core::wav::encode_wav;

use crate::error::HistoryError;

#[derive(Debug, Clone, Serialize)]
pub struct HistoryRow {
    pub event_id: String,
    pub match_id: String,
    pub path: String,
    pub duration_seconds: f64,
    pub created_at: i64,
}

/// Narrow persistence seam — the default impl appends JSONL next to the
/// audio; a real metadata database is an external collaborator this core
/// does not depend on.
pub trait HistoryStore: Send + Sync {
    fn insert_row(&self, row: HistoryRow) -> Result<(), HistoryError>;
}

pub struct JsonlHistoryStore {
    path: PathBuf,
}

impl JsonlHistoryStore {
    pub fn new(dir: &std::path::Path) -> Self {
        Self {
            path: dir.join("history.jsonl"),
        }
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn insert_row(&self, row: HistoryRow) -> Result<(), HistoryError> {
        use std::io::Write;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HistoryError::Row(e.to_string()))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| HistoryError::Row(e.to_string()))?;
        let line = serde_json::to_string(&row).map_err(|e| HistoryError::Row(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| HistoryError::Row(e.to_string()))?;
        Ok(())
    }
}

pub struct HistoryClip {
    pub event_id: String,
    pub match_id: String,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Cloneable handle the orchestrator/mixer push finished clips into.
#[derive(Clone)]
pub struct HistorySink {
    tx: mpsc::Sender<HistoryClip>,
}

impl HistorySink {
    /// Spawn the background writer task. `capacity` bounds the channel —
    /// a full channel drops the submitted clip and logs, never blocks.
    pub fn spawn(
        audio_history_dir: PathBuf,
        store: std::sync::Arc<dyn HistoryStore>,
        capacity: usize,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<HistoryClip>(capacity);

        tokio::spawn(async move {
            while let Some(clip) = rx.recv().await {
                if let Err(e) = write_clip(&audio_history_dir, &store, clip) {
                    warn!("history: failed to persist clip: {e}");
                }
            }
        });

        Self { tx }
    }

    /// Best-effort submission. Returns immediately; a full channel drops
    /// the clip and logs instead of blocking the caller.
    pub fn submit(&self, clip: HistoryClip) {
        if self.tx.try_send(clip).is_err() {
            warn!("history: channel full, dropping clip");
        }
    }
}

fn write_clip(
    dir: &std::path::Path,
    store: &std::sync::Arc<dyn HistoryStore>,
    clip: HistoryClip,
) -> Result<(), HistoryError> {
    std::fs::create_dir_all(dir).map_err(|e| HistoryError::Io(e.to_string()))?;

    let filename = format!("{}.wav", clip.event_id);
    let path = dir.join(&filename);
    let bytes = encode_wav(&clip.samples, clip.sample_rate, clip.channels);
    std::fs::write(&path, &bytes).map_err(|e| HistoryError::Io(e.to_string()))?;

    let duration_seconds =
        clip.samples.len() as f64 / (clip.sample_rate as f64 * clip.channels.max(1) as f64);

    store.insert_row(HistoryRow {
        event_id: clip.event_id,
        match_id: clip.match_id,
        path: path.to_string_lossy().into_owned(),
        duration_seconds,
        created_at: chrono::Utc::now().timestamp(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingStore {
        rows: std::sync::Mutex<Vec<HistoryRow>>,
    }

    impl HistoryStore for RecordingStore {
        fn insert_row(&self, row: HistoryRow) -> Result<(), HistoryError> {
            self.rows.lock().unwrap().push(row);
            Ok(())
        }
    }

    #[test]
    fn write_clip_produces_wav_and_row() {
        let dir = std::env::temp_dir().join(format!("matchcast_history_test_{}", std::process::id()));
        let store: std::sync::Arc<dyn HistoryStore> = std::sync::Arc::new(RecordingStore {
            rows: std::sync::Mutex::new(Vec::new()),
        });

        let clip = HistoryClip {
            event_id: "e1".into(),
            match_id: "m1".into(),
            samples: vec![0, 100, -100, 200],
            sample_rate: 22_050,
            channels: 2,
        };
        write_clip(&dir, &store, clip).unwrap();

        assert!(dir.join("e1.wav").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let dir = std::env::temp_dir().join(format!("matchcast_history_test2_{}", std::process::id()));
        let store: std::sync::Arc<dyn HistoryStore> = std::sync::Arc::new(RecordingStore {
            rows: std::sync::Mutex::new(Vec::new()),
        });
        let sink = HistorySink::spawn(dir.clone(), store, 1);

        for i in 0..10 {
            sink.submit(HistoryClip {
                event_id: format!("e{i}"),
                match_id: "m1".into(),
                samples: vec![1, 2],
                sample_rate: 22_050,
                channels: 2,
            });
        }
        tokio::task::yield_now().await;
        std::fs::remove_dir_all(&dir).ok();
    }
}

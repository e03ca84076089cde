//! The one durable record this engine keeps: `{match_id, last_spoken_event_id}`.
//!
//! Kept deliberately separate from [`crate::match_state::MatchState`] — match
//! state is derived fresh from upstream on every process start and does not
//! need to survive a restart; only the checkpoint does.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;

/// `{match_id, last_spoken_event_id, last_update}`, persisted atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub match_id: Option<String>,
    pub last_spoken_event_id: Option<String>,
    pub last_update: i64,
}

impl RuntimeState {
    /// Load the checkpoint from `path`. A missing file is not an error — a
    /// fresh engine has no prior checkpoint.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        match std::fs::read(path) {
            Ok(bytes) => {
                let state = serde_json::from_slice(&bytes)
                    .map_err(|e| PersistError::Decode(e.to_string()))?;
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(PersistError::Io(e.to_string())),
        }
    }

    /// Atomically replace the checkpoint file: write to `<path>.tmp`,
    /// `fsync`, then rename over the target. Never leaves a half-written
    /// file at `path` — a crash mid-write only loses the `.tmp` file.
    pub fn persist(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::Io(e.to_string()))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let bytes =
            serde_json::to_vec_pretty(self).map_err(|e| PersistError::Decode(e.to_string()))?;

        let mut file =
            std::fs::File::create(&tmp_path).map_err(|e| PersistError::Io(e.to_string()))?;
        use std::io::Write;
        file.write_all(&bytes)
            .map_err(|e| PersistError::Io(e.to_string()))?;
        file.sync_all().map_err(|e| PersistError::Io(e.to_string()))?;
        drop(file);

        std::fs::rename(&tmp_path, path).map_err(|e| PersistError::Io(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_returns_default() {
        let path = std::env::temp_dir().join("matchcast_does_not_exist.json");
        let state = RuntimeState::load(&path).unwrap();
        assert_eq!(state, RuntimeState::default());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("matchcast_test_{}", std::process::id()));
        let path = dir.join("runtime_state.json");

        let state = RuntimeState {
            match_id: Some("m1".into()),
            last_spoken_event_id: Some("e5".into()),
            last_update: 1_700_000_000,
        };
        state.persist(&path).unwrap();

        let loaded = RuntimeState::load(&path).unwrap();
        assert_eq!(loaded, state);

        // No leftover temp file after a successful rename.
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn persist_overwrites_previous_checkpoint() {
        let dir = std::env::temp_dir().join(format!("matchcast_test2_{}", std::process::id()));
        let path = dir.join("runtime_state.json");

        RuntimeState {
            match_id: Some("m1".into()),
            last_spoken_event_id: Some("e1".into()),
            last_update: 1,
        }
        .persist(&path)
        .unwrap();

        RuntimeState {
            match_id: Some("m1".into()),
            last_spoken_event_id: Some("e2".into()),
            last_update: 2,
        }
        .persist(&path)
        .unwrap();

        let loaded = RuntimeState::load(&path).unwrap();
        assert_eq!(loaded.last_spoken_event_id.as_deref(), Some("e2"));

        std::fs::remove_dir_all(&dir).ok();
    }
}

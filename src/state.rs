use crate::failure::Failure;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Playback state owned by the player machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum PlayerState {
    #[default]
    Uninitialized,
    Playing,
    Paused,
    Stopped,
}

impl PlayerState {
    pub fn is_initialized(self) -> bool {
        self != Self::Uninitialized
    }
}

/// Recording state owned by the recorder machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum RecorderState {
    #[default]
    Uninitialized,
    Recording,
    Stopped,
}

impl RecorderState {
    pub fn is_initialized(self) -> bool {
        self != Self::Uninitialized
    }
}

/// A finished recording on disk
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordingDetails {
    pub path: PathBuf,
    pub name: String,
    pub duration: Duration,
}

impl RecordingDetails {
    pub fn new(path: impl Into<PathBuf>, duration: Duration) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self {
            path,
            name,
            duration,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// One tick of the player's position stream
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackProgress {
    pub position: Duration,
    pub duration: Duration,
}

/// Observable player aggregate.
///
/// Values are never mutated after publication; every change goes through one
/// of the `with_*` builders and produces a fresh value. `error` is only set on
/// the value published right after a failed operation, which is then replaced
/// by the state from before the call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PlayerControlState {
    pub state: PlayerState,
    pub progress: PlaybackProgress,
    pub recording: Option<RecordingDetails>,
    pub processing: bool,
    pub error: Option<Failure>,
}

impl PlayerControlState {
    pub fn with_state(&self, state: PlayerState) -> Self {
        Self {
            state,
            processing: false,
            ..self.clone()
        }
    }

    pub fn with_progress(&self, progress: PlaybackProgress) -> Self {
        Self {
            progress,
            ..self.clone()
        }
    }

    pub fn with_recording(&self, recording: Option<RecordingDetails>) -> Self {
        Self {
            recording,
            ..self.clone()
        }
    }

    pub fn with_processing(&self, processing: bool) -> Self {
        Self {
            processing,
            ..self.clone()
        }
    }

    pub fn with_error(&self, error: Option<Failure>) -> Self {
        Self {
            error,
            ..self.clone()
        }
    }
}

/// Observable recorder aggregate
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecorderControlState {
    pub state: RecorderState,
    pub elapsed: Duration,
    pub pending: Option<RecordingDetails>,
    pub processing: bool,
    pub error: Option<Failure>,
}

impl RecorderControlState {
    pub fn with_state(&self, state: RecorderState) -> Self {
        Self {
            state,
            processing: false,
            ..self.clone()
        }
    }

    pub fn with_elapsed(&self, elapsed: Duration) -> Self {
        Self {
            elapsed,
            ..self.clone()
        }
    }

    pub fn with_pending(&self, pending: Option<RecordingDetails>) -> Self {
        Self {
            pending,
            ..self.clone()
        }
    }

    pub fn with_processing(&self, processing: bool) -> Self {
        Self {
            processing,
            ..self.clone()
        }
    }

    pub fn with_error(&self, error: Option<Failure>) -> Self {
        Self {
            error,
            ..self.clone()
        }
    }
}

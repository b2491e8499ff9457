use crate::failure::Outcome;
use crate::state::{PlaybackProgress, PlayerState, RecorderState, RecordingDetails};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

/// Streams a player service pushes after `initialize`
pub struct PlayerStreams {
    pub states: mpsc::UnboundedReceiver<PlayerState>,
    pub positions: mpsc::UnboundedReceiver<PlaybackProgress>,
}

/// Streams a recorder service pushes after `initialize`
pub struct RecorderStreams {
    pub states: mpsc::UnboundedReceiver<RecorderState>,
    pub elapsed: mpsc::UnboundedReceiver<Duration>,
}

/// Device-side playback.
///
/// Implementations do the actual audio work; the player machine validates
/// every call before it gets here. Only device-side changes are pushed on the
/// state stream, such as `PlayerState::Stopped` when a file plays to the end;
/// calls made by the machine are not echoed back.
#[async_trait]
pub trait PlayerService: Send {
    async fn initialize(&mut self) -> Outcome<PlayerStreams>;

    async fn dispose(&mut self) -> Outcome<()>;

    async fn start(&mut self, path: &Path) -> Outcome<()>;

    async fn pause(&mut self) -> Outcome<()>;

    async fn resume(&mut self) -> Outcome<()>;

    async fn stop(&mut self) -> Outcome<()>;

    async fn seek(&mut self, position: Duration) -> Outcome<()>;
}

/// Device-side recording
#[async_trait]
pub trait RecorderService: Send {
    async fn initialize(&mut self) -> Outcome<RecorderStreams>;

    async fn dispose(&mut self) -> Outcome<()>;

    async fn start_recording(&mut self) -> Outcome<()>;

    /// Finish the active recording and describe the file it produced
    async fn stop_recording(&mut self) -> Outcome<RecordingDetails>;

    /// Persist a pending recording under `name`, returning the saved details
    async fn save(&mut self, recording: &RecordingDetails, name: &str) -> Outcome<RecordingDetails>;

    /// Discard a pending recording
    async fn delete(&mut self, recording: &RecordingDetails) -> Outcome<()>;
}
